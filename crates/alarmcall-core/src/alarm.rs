use crate::model::TrackingRecord;
use serde::Serialize;
use serde_json::Value;

pub const KPI_THRESHOLD: f64 = -9.0;
pub const ERROR_MARKER: &str = "ini";
pub const STATUS_MARKER: &str = "Verificar";

/// Which clause of the alarm rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    KpiBelowThreshold,
    ErrorMarker,
    StatusMarker,
}

#[derive(Debug, Clone)]
pub struct AlarmDecision<'a> {
    pub record: &'a TrackingRecord,
    pub fin_kpi: f64,
    pub triggers: Vec<Trigger>,
}

impl AlarmDecision<'_> {
    pub fn should_call(&self) -> bool {
        !self.triggers.is_empty()
    }
}

/// Evaluates the alarm rule. Total: malformed input degrades, never fails.
pub fn evaluate(record: &TrackingRecord) -> AlarmDecision<'_> {
    let fin_kpi = coerce_kpi(&record.fin_kpi);
    let mut triggers = Vec::new();

    if fin_kpi < KPI_THRESHOLD {
        triggers.push(Trigger::KpiBelowThreshold);
    }
    if record.error.contains(ERROR_MARKER) {
        triggers.push(Trigger::ErrorMarker);
    }
    if record.status.contains(STATUS_MARKER) {
        triggers.push(Trigger::StatusMarker);
    }

    AlarmDecision {
        record,
        fin_kpi,
        triggers,
    }
}

/// `fin_kpi` as a float; anything missing or non-numeric reads as 0.
pub fn coerce_kpi(v: &Value) -> f64 {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| !f.is_nan()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(fin_kpi: Value, error: &str, status: &str) -> TrackingRecord {
        TrackingRecord {
            fin_kpi,
            error: error.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    #[test]
    fn kpi_below_threshold_triggers() {
        let r = rec(json!(-10), "", "");
        let d = evaluate(&r);
        assert!(d.should_call());
        assert_eq!(d.triggers, vec![Trigger::KpiBelowThreshold]);
    }

    #[test]
    fn kpi_at_or_above_threshold_is_quiet() {
        assert!(!evaluate(&rec(json!(-5), "", "")).should_call());
        assert!(!evaluate(&rec(json!(-9), "", "")).should_call());
        assert!(!evaluate(&rec(json!("-9.0"), "", "")).should_call());
        assert!(evaluate(&rec(json!("-9.01"), "", "")).should_call());
    }

    #[test]
    fn error_substring_triggers() {
        let r = rec(Value::Null, "reiniciar", "");
        assert_eq!(evaluate(&r).triggers, vec![Trigger::ErrorMarker]);
        // case-sensitive
        assert!(!evaluate(&rec(Value::Null, "INICIO", "")).should_call());
    }

    #[test]
    fn status_substring_triggers() {
        let r = rec(Value::Null, "", "Verificar unidad");
        assert_eq!(evaluate(&r).triggers, vec![Trigger::StatusMarker]);
        assert!(!evaluate(&rec(Value::Null, "", "verificar")).should_call());
    }

    #[test]
    fn all_clauses_are_reported() {
        let r = rec(json!(-20.5), "sin inicio", "Verificar GPS");
        assert_eq!(
            evaluate(&r).triggers,
            vec![
                Trigger::KpiBelowThreshold,
                Trigger::ErrorMarker,
                Trigger::StatusMarker
            ]
        );
    }

    #[test]
    fn non_numeric_kpi_reads_as_zero() {
        let r = rec(json!("abc"), "", "");
        let d = evaluate(&r);
        assert_eq!(d.fin_kpi, 0.0);
        assert!(!d.should_call());

        assert_eq!(coerce_kpi(&Value::Null), 0.0);
        assert_eq!(coerce_kpi(&json!(true)), 0.0);
        assert_eq!(coerce_kpi(&json!({"v": -50})), 0.0);
        assert_eq!(coerce_kpi(&json!("NaN")), 0.0);
        assert_eq!(coerce_kpi(&json!(" -11 ")), -11.0);
    }
}
