use crate::model::UncallableAlarm;
use crate::storage::Store;
use rusqlite::params;

/// Durable record of alarm ids already acted upon, plus the log of alarms
/// that fired but could not be called.
#[derive(Clone)]
pub struct Ledger {
    store: Store,
}

impl Ledger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Opens the store at `url` and ensures the schema exists.
    pub fn connect(url: &str) -> anyhow::Result<Self> {
        let store = Store::connect(url)?;
        store.init_schema()?;
        Ok(Self::new(store))
    }

    pub fn has(&self, alarm_id: &str) -> anyhow::Result<bool> {
        let conn = self.store.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT 1 FROM processed_alarms WHERE alarm_id = ?1")?;
        Ok(stmt.exists(params![alarm_id])?)
    }

    /// Marks an id as processed. Marking twice is a no-op.
    pub fn mark(&self, alarm_id: &str) -> anyhow::Result<()> {
        let conn = self.store.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO processed_alarms(alarm_id, processed_at) VALUES (?1, ?2)
             ON CONFLICT(alarm_id) DO NOTHING",
            params![alarm_id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn processed_count(&self) -> anyhow::Result<u64> {
        let conn = self.store.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT count(*) FROM processed_alarms", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// Logs an alarm that fired but could not be called. A repeat of the same
    /// alarm id and reason refreshes the existing row instead of adding one.
    pub fn log_uncallable(&self, alarm: &UncallableAlarm) -> anyhow::Result<()> {
        let conn = self.store.conn.lock().unwrap();
        let refreshed = conn.execute(
            "UPDATE uncallable_alarms
             SET driver = ?3, car = ?4, route_desc = ?5, start_time = ?6,
                 cellphone = ?7, logged_at = ?8
             WHERE alarm_id IS ?1 AND reason = ?2",
            params![
                alarm.alarm_id,
                alarm.reason,
                alarm.driver,
                alarm.car,
                alarm.route_desc,
                alarm.start_time,
                alarm.cellphone,
                alarm.logged_at
            ],
        )?;
        if refreshed > 0 {
            return Ok(());
        }

        conn.execute(
            "INSERT INTO uncallable_alarms(
                alarm_id, reason, driver, car, route_desc, start_time, cellphone, logged_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                alarm.alarm_id,
                alarm.reason,
                alarm.driver,
                alarm.car,
                alarm.route_desc,
                alarm.start_time,
                alarm.cellphone,
                alarm.logged_at
            ],
        )?;
        Ok(())
    }

    /// Most recent uncallable entries first.
    pub fn recent_uncallable(&self, limit: u32) -> anyhow::Result<Vec<UncallableAlarm>> {
        let conn = self.store.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT alarm_id, reason, driver, car, route_desc, start_time, cellphone, logged_at
             FROM uncallable_alarms
             ORDER BY logged_at DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            Ok(UncallableAlarm {
                alarm_id: row.get(0)?,
                reason: row.get(1)?,
                driver: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                car: row.get(3)?,
                route_desc: row.get(4)?,
                start_time: row.get(5)?,
                cellphone: row.get(6)?,
                logged_at: row.get(7)?,
            })
        })?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}
