use crate::schedule::{Day, Slot, TimeSlot};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("timetable.sqlite3");
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_slots(
            day TEXT NOT NULL,
            period_id INTEGER NOT NULL,
            class_id TEXT,
            class_name TEXT,
            subject TEXT,
            is_homeroom INTEGER NOT NULL DEFAULT 0,
            start_time TEXT,
            end_time TEXT,
            duration_minutes INTEGER,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_slots_day ON timetable_slots(day, period_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bell_times(
            period_id INTEGER PRIMARY KEY,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        params![key, serde_json::to_string(value)?],
    )?;
    Ok(())
}

/// Replaces the cached timetable in one transaction.
pub fn timetable_replace<'a>(
    conn: &mut Connection,
    slots: impl IntoIterator<Item = &'a Slot>,
    bells: &[TimeSlot],
) -> anyhow::Result<usize> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM timetable_slots", [])?;
    tx.execute("DELETE FROM bell_times", [])?;
    let mut count = 0usize;
    {
        let mut insert = tx.prepare(
            "INSERT INTO timetable_slots(
                day, period_id, class_id, class_name, subject, is_homeroom,
                start_time, end_time, duration_minutes, sort_order
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for slot in slots {
            insert.execute(params![
                slot.day.as_str(),
                slot.period_id,
                slot.class_id,
                slot.class_name,
                slot.subject,
                slot.is_homeroom as i64,
                slot.start_time,
                slot.end_time,
                slot.duration_minutes,
                count as i64,
            ])?;
            count += 1;
        }
        let mut insert_bell =
            tx.prepare("INSERT OR REPLACE INTO bell_times(period_id, start_time, end_time) VALUES(?, ?, ?)")?;
        for bell in bells {
            insert_bell.execute(params![bell.period_id, bell.start_time, bell.end_time])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn timetable_load(conn: &Connection) -> anyhow::Result<(Vec<Slot>, Vec<TimeSlot>)> {
    let mut stmt = conn.prepare(
        "SELECT day, period_id, class_id, class_name, subject, is_homeroom,
                start_time, end_time, duration_minutes
         FROM timetable_slots
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                Slot {
                    // Placeholder until the stored day is parsed below.
                    day: Day::Monday,
                    period_id: r.get(1)?,
                    class_id: r.get(2)?,
                    class_name: r.get(3)?,
                    subject: r.get(4)?,
                    is_homeroom: r.get::<_, i64>(5)? != 0,
                    start_time: r.get(6)?,
                    end_time: r.get(7)?,
                    duration_minutes: r.get(8)?,
                    is_current: None,
                    is_upcoming: None,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut slots = Vec::with_capacity(rows.len());
    for (day, mut slot) in rows {
        slot.day = day.parse()?;
        slots.push(slot);
    }

    let mut bell_stmt =
        conn.prepare("SELECT period_id, start_time, end_time FROM bell_times ORDER BY period_id")?;
    let bells = bell_stmt
        .query_map([], |r| {
            Ok(TimeSlot {
                period_id: r.get(0)?,
                start_time: r.get(1)?,
                end_time: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((slots, bells))
}
