pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS processed_alarms (
  alarm_id TEXT PRIMARY KEY,
  processed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS uncallable_alarms (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  alarm_id TEXT,
  reason TEXT NOT NULL,
  driver TEXT,
  car TEXT,
  route_desc TEXT,
  start_time TEXT,
  cellphone TEXT,
  logged_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_uncallable_alarm_reason ON uncallable_alarms(alarm_id, reason);
"#;
