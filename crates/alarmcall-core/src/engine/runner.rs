use crate::alarm::{evaluate, AlarmDecision};
use crate::config::{AppConfig, MarkPolicy};
use crate::errors::{RecordError, RunError};
use crate::model::{CallRequest, RunSummary, TrackingRecord, UncallableAlarm};
use crate::phone::{normalize, CountryCode};
use crate::providers::bustrax::BustraxClient;
use crate::providers::retell::RetellClient;
use crate::providers::{http_client, CallPlacer, TrackingSource};
use crate::storage::Ledger;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const CALL_TYPE: &str = "phone_call";

#[derive(Debug, Clone)]
pub struct RunPolicy {
    pub country_code: CountryCode,
    pub mark_policy: MarkPolicy,
    pub from_number: String,
    pub agent_id: String,
    /// When set, every call goes to this number instead of the driver's.
    pub test_phone_number: Option<String>,
    pub poll_interval: Duration,
}

impl RunPolicy {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            country_code: cfg.dispatch.country_code.clone(),
            mark_policy: cfg.dispatch.mark_policy,
            from_number: cfg.retell.from_number.clone(),
            agent_id: cfg.retell.agent_id.clone(),
            test_phone_number: cfg.retell.test_phone_number.clone(),
            poll_interval: cfg.dispatch.poll_interval,
        }
    }
}

/// Runs the fetch → evaluate → call pipeline. One record at a time, one
/// call in flight.
pub struct Runner {
    pub tracking: Arc<dyn TrackingSource>,
    pub caller: Arc<dyn CallPlacer>,
    pub ledger: Option<Ledger>,
    pub policy: RunPolicy,
}

impl Runner {
    /// Wires the production vendor clients and, when configured, the ledger.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let client = http_client(cfg.http_timeout)?;
        let ledger = match &cfg.dispatch.database_url {
            Some(url) => Some(Ledger::connect(url)?),
            None => {
                tracing::warn!(
                    event = "ledger_disabled",
                    "DATABASE_URL not set; alarms will be called on every run"
                );
                None
            }
        };

        Ok(Self {
            tracking: Arc::new(BustraxClient::new(cfg.bustrax.clone(), client.clone())),
            caller: Arc::new(RetellClient::new(&cfg.retell, client)),
            ledger,
            policy: RunPolicy::from_config(cfg),
        })
    }

    pub async fn run_once(&self) -> Result<RunSummary, RunError> {
        tracing::info!(
            event = "run_start",
            tracking = self.tracking.provider_name(),
            caller = self.caller.provider_name()
        );

        // 1) Authenticate
        let token = self.tracking.authenticate().await.map_err(|e| {
            tracing::error!(event = "auth_failed", error = %e);
            RunError::Auth(e)
        })?;
        tracing::debug!(event = "auth_ok", token_prefix = %token_prefix(&token));

        // 2) Fetch
        let batch = self.tracking.fetch(&token).await.map_err(|e| {
            tracing::error!(event = "fetch_failed", error = %e);
            RunError::Fetch(e)
        })?;

        let mut summary = RunSummary {
            errors: batch.rejected,
            ..Default::default()
        };

        // 3) Evaluate and call, strictly in feed order
        for rec in &batch.records {
            self.process_record(rec, &mut summary).await;
        }

        tracing::info!(
            event = "run_complete",
            checked = summary.checked,
            triggered = summary.triggered,
            errors = summary.errors.len()
        );
        Ok(summary)
    }

    async fn process_record(&self, rec: &TrackingRecord, summary: &mut RunSummary) {
        summary.checked += 1;

        let decision = evaluate(rec);
        if !decision.should_call() {
            tracing::debug!(
                event = "no_alarm",
                alarm_id = ?rec.alarm_id(),
                fin_kpi = decision.fin_kpi
            );
            return;
        }

        let alarm_id = rec.alarm_id();
        tracing::info!(
            event = "alarm_triggered",
            alarm_id = ?alarm_id,
            driver = %rec.driver(),
            triggers = ?decision.triggers
        );

        // Dedup gate
        if let Some(ledger) = &self.ledger {
            match alarm_id {
                Some(id) => match ledger.has(id) {
                    Ok(true) => {
                        tracing::info!(event = "alarm_skipped_dedup", alarm_id = %id);
                        return;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        let err = RecordError::Ledger {
                            alarm_id: id.to_string(),
                            reason: format!("{e:#}"),
                        };
                        tracing::error!(event = "ledger_error", error = %err);
                        summary.errors.push(err.to_string());
                        return;
                    }
                },
                None => {
                    tracing::warn!(
                        event = "alarm_without_id",
                        driver = %rec.driver(),
                        "record has no trip id; dedup bypassed"
                    );
                }
            }
        }

        let raw_phone = match &self.policy.test_phone_number {
            Some(test) => test.clone(),
            None => rec.cellphone.clone().unwrap_or_default(),
        };

        let Some(to_number) = normalize(&raw_phone, &self.policy.country_code) else {
            let err = RecordError::UnformattablePhone {
                driver: rec.driver().to_string(),
                raw: raw_phone,
            };
            tracing::warn!(event = "phone_unformattable", alarm_id = ?alarm_id, error = %err);
            self.record_uncallable(rec, &err);
            summary.errors.push(err.to_string());
            return;
        };

        let req = self.build_call(&decision, &to_number);
        match self.caller.place_call(&req).await {
            Ok(receipt) => {
                summary.triggered += 1;
                tracing::info!(
                    event = "call_placed",
                    alarm_id = ?alarm_id,
                    to = %to_number,
                    call_id = ?receipt.call_id
                );
                self.mark(alarm_id, summary);
            }
            Err(source) => {
                let err = RecordError::CallFailed {
                    to: to_number,
                    driver: rec.driver().to_string(),
                    source,
                };
                tracing::warn!(event = "call_failed", alarm_id = ?alarm_id, error = %err);
                self.record_uncallable(rec, &err);
                summary.errors.push(err.to_string());
                if self.policy.mark_policy == MarkPolicy::Always {
                    self.mark(alarm_id, summary);
                }
            }
        }
    }

    fn build_call(&self, decision: &AlarmDecision<'_>, to_number: &str) -> CallRequest {
        let rec = decision.record;
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        let trip_id = rec.alarm_id().unwrap_or_default().to_string();

        let mut vars = BTreeMap::new();
        vars.insert("driver_name".to_string(), rec.driver().to_string());
        vars.insert("trip_id".to_string(), trip_id.clone());
        vars.insert("car".to_string(), opt(&rec.car));
        vars.insert("route".to_string(), opt(&rec.route_desc));
        vars.insert("start_time".to_string(), opt(&rec.start_time));
        vars.insert("fin_kpi".to_string(), decision.fin_kpi.to_string());
        vars.insert("error".to_string(), rec.error.clone());
        vars.insert("status".to_string(), rec.status.clone());

        let mut metadata = BTreeMap::new();
        if !trip_id.is_empty() {
            metadata.insert("trip_id".to_string(), trip_id);
        }

        CallRequest {
            from_number: self.policy.from_number.clone(),
            to_number: to_number.to_string(),
            call_type: CALL_TYPE.to_string(),
            agent_id: self.policy.agent_id.clone(),
            dynamic_variables: vars,
            metadata,
        }
    }

    fn mark(&self, alarm_id: Option<&str>, summary: &mut RunSummary) {
        let (Some(ledger), Some(id)) = (&self.ledger, alarm_id) else {
            return;
        };
        if let Err(e) = ledger.mark(id) {
            let err = RecordError::Ledger {
                alarm_id: id.to_string(),
                reason: format!("{e:#}"),
            };
            tracing::error!(event = "ledger_error", error = %err);
            summary.errors.push(err.to_string());
        }
    }

    fn record_uncallable(&self, rec: &TrackingRecord, err: &RecordError) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let entry = UncallableAlarm::from_record(rec, err.to_string());
        if let Err(e) = ledger.log_uncallable(&entry) {
            tracing::warn!(event = "uncallable_log_failed", error = %e);
        }
    }

    /// Runs until `shutdown` resolves. Shutdown is honored between runs,
    /// never in the middle of one.
    pub async fn poll_forever<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut iteration: u64 = 0;

        loop {
            iteration += 1;
            tracing::info!(event = "poll_tick", iteration);
            if let Err(e) = self.run_once().await {
                tracing::error!(event = "poll_run_failed", stage = e.stage(), error = %e);
            }

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(event = "poll_stopped", iterations = iteration);
                    break;
                }
                _ = tokio::time::sleep(self.policy.poll_interval) => {}
            }
        }
    }
}

fn token_prefix(token: &str) -> String {
    token.chars().take(6).collect::<String>() + "…"
}
