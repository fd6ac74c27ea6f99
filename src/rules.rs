//! Threshold rules
//!
//! A [`RuleBook`] holds user-defined [`AutomatedRule`]s keyed by id. At most
//! one rule per channel is enabled at a time: upserting an enabled rule
//! disables any other enabled rule watching the same channel.
//!
//! [`RuleBook::evaluate`] is a pure pass over the rules and the latest
//! stored values. It returns the alerts to send; delivery is the caller's
//! concern.

use crate::error::ValidationError;
use crate::protocol::Channel;
use crate::store::ChannelStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Direction of a threshold comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Higher,
    Lower,
}

impl Comparison {
    /// API name
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Higher => "higher",
            Comparison::Lower => "lower",
        }
    }

    /// Whether `current` crosses `threshold` (strictly)
    pub fn triggers(&self, current: f64, threshold: f64) -> bool {
        match self {
            Comparison::Higher => current > threshold,
            Comparison::Lower => current < threshold,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "higher" => Ok(Comparison::Higher),
            "lower" => Ok(Comparison::Lower),
            _ => Err(ValidationError::InvalidComparison(s.to_string())),
        }
    }
}

/// Outbound notification transport
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Sms,
    Telegram,
    Whatsapp,
    Email,
}

impl NotificationChannel {
    /// Every transport
    pub const ALL: [NotificationChannel; 4] = [
        NotificationChannel::Sms,
        NotificationChannel::Telegram,
        NotificationChannel::Whatsapp,
        NotificationChannel::Email,
    ];

    /// API name
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Sms => "sms",
            NotificationChannel::Telegram => "telegram",
            NotificationChannel::Whatsapp => "whatsapp",
            NotificationChannel::Email => "email",
        }
    }

    /// Parse a list of names, rejecting the first unknown one
    pub fn parse_list<S: AsRef<str>>(
        names: &[S],
    ) -> Result<BTreeSet<NotificationChannel>, ValidationError> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        NotificationChannel::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownNotificationChannel(s.to_string()))
    }
}

/// A threshold condition on a channel's latest value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomatedRule {
    pub id: String,
    pub channel: Channel,
    pub threshold: f64,
    pub comparison: Comparison,
    pub message: String,
    pub channels: BTreeSet<NotificationChannel>,
    pub enabled: bool,
}

impl AutomatedRule {
    /// Create an enabled rule with no notification targets
    pub fn new(
        id: impl Into<String>,
        channel: Channel,
        threshold: f64,
        comparison: Comparison,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel,
            threshold,
            comparison,
            message: message.into(),
            channels: BTreeSet::new(),
            enabled: true,
        }
    }

    /// Add a notification target
    pub fn with_target(mut self, target: NotificationChannel) -> Self {
        self.channels.insert(target);
        self
    }

    /// Set the enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Message sent when the rule fires at `current`
    pub fn alert_message(&self, current: f64) -> String {
        format!(
            "{} | {} = {} ({} than threshold {})",
            self.message, self.channel, current, self.comparison, self.threshold
        )
    }
}

/// Unvalidated rule as submitted by a management client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "channel")]
    pub metric_id: String,
    pub threshold: f64,
    pub comparison: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<RuleRequest> for AutomatedRule {
    type Error = ValidationError;

    fn try_from(req: RuleRequest) -> Result<Self, Self::Error> {
        let channel: Channel = req.metric_id.parse()?;
        if !req.threshold.is_finite() {
            return Err(ValidationError::InvalidRule(
                "threshold must be a finite number".to_string(),
            ));
        }
        let comparison: Comparison = req.comparison.parse()?;
        let channels = NotificationChannel::parse_list(&req.channels)?;

        let id = req
            .id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| channel.as_str().to_string());

        Ok(Self {
            id,
            channel,
            threshold: req.threshold,
            comparison,
            message: req.message,
            channels,
            enabled: req.enabled,
        })
    }
}

/// What an upsert changed
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpsertOutcome {
    /// Rule previously stored under the same id
    pub replaced: Option<AutomatedRule>,
    /// Ids of rules disabled because they watched the same channel
    pub superseded: Vec<String>,
}

/// A rule that fired
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub rule_id: String,
    pub channel: Channel,
    pub threshold: f64,
    pub current: f64,
    pub comparison: Comparison,
    pub message: String,
    pub targets: BTreeSet<NotificationChannel>,
    pub device_id: u16,
    pub timestamp: DateTime<Utc>,
}

/// Result of one evaluation pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    /// Rules whose condition held
    pub alerts: Vec<Alert>,
    /// Enabled rules skipped because their channel has no usable value
    pub skipped: Vec<String>,
}

/// Thread-safe rule table keyed by id
#[derive(Debug, Default)]
pub struct RuleBook {
    rules: RwLock<BTreeMap<String, AutomatedRule>>,
}

impl RuleBook {
    /// Create an empty rule book
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a rule
    pub fn upsert(&self, rule: AutomatedRule) -> UpsertOutcome {
        let mut rules = self.write_guard();
        let mut superseded = Vec::new();

        if rule.enabled {
            for other in rules.values_mut() {
                if other.id != rule.id && other.channel == rule.channel && other.enabled {
                    other.enabled = false;
                    #[cfg(feature = "logging")]
                    log::info!("rule {} disabled, superseded by {}", other.id, rule.id);
                    superseded.push(other.id.clone());
                }
            }
        }

        let replaced = rules.insert(rule.id.clone(), rule);
        UpsertOutcome {
            replaced,
            superseded,
        }
    }

    /// Remove a rule by id
    pub fn remove(&self, id: &str) -> Option<AutomatedRule> {
        self.write_guard().remove(id)
    }

    /// Rule by id
    pub fn get(&self, id: &str) -> Option<AutomatedRule> {
        self.read_guard().get(id).cloned()
    }

    /// All rules, ordered by id
    pub fn list(&self) -> Vec<AutomatedRule> {
        self.read_guard().values().cloned().collect()
    }

    /// Number of stored rules
    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    /// Check if no rule is stored
    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    /// Check every enabled rule against the latest stored values
    pub fn evaluate(&self, store: &ChannelStore) -> Evaluation {
        let rules = self.list();
        let mut evaluation = Evaluation::default();

        for rule in rules.into_iter().filter(|r| r.enabled) {
            let latest = store.read_latest(rule.channel, None);
            let Some((reading, current)) =
                latest.and_then(|r| r.value.magnitude().map(|v| (r, v)))
            else {
                evaluation.skipped.push(rule.id);
                continue;
            };

            if rule.comparison.triggers(current, rule.threshold) {
                evaluation.alerts.push(Alert {
                    message: rule.alert_message(current),
                    rule_id: rule.id,
                    channel: rule.channel,
                    threshold: rule.threshold,
                    current,
                    comparison: rule.comparison,
                    targets: rule.channels,
                    device_id: reading.device_id,
                    timestamp: reading.timestamp,
                });
            }
        }

        evaluation
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, BTreeMap<String, AutomatedRule>> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, BTreeMap<String, AutomatedRule>> {
        self.rules.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Value;

    fn temperature_rule(id: &str, threshold: f64, comparison: Comparison) -> AutomatedRule {
        AutomatedRule::new(id, Channel::Temperature, threshold, comparison, "Heat")
            .with_target(NotificationChannel::Sms)
            .with_target(NotificationChannel::Email)
    }

    #[test]
    fn test_rule_fires_higher() {
        let store = ChannelStore::new(10);
        store.write(4, Utc::now(), [(Channel::Temperature, Value::Scalar(60.0))]);

        let book = RuleBook::new();
        book.upsert(temperature_rule("t", 50.0, Comparison::Higher));

        let evaluation = book.evaluate(&store);
        assert_eq!(evaluation.alerts.len(), 1);
        let alert = &evaluation.alerts[0];
        assert_eq!(alert.targets.len(), 2);
        assert_eq!(alert.device_id, 4);
        assert!(alert.message.contains("60"));
        assert!(alert.message.contains("50"));
        assert_eq!(
            alert.message,
            "Heat | temperature = 60 (higher than threshold 50)"
        );
    }

    #[test]
    fn test_rule_strict_comparison() {
        let store = ChannelStore::new(10);
        store.write(1, Utc::now(), [(Channel::Temperature, Value::Scalar(50.0))]);

        let book = RuleBook::new();
        book.upsert(temperature_rule("a", 50.0, Comparison::Higher));
        assert!(book.evaluate(&store).alerts.is_empty());

        book.upsert(temperature_rule("a", 51.0, Comparison::Lower));
        assert_eq!(book.evaluate(&store).alerts.len(), 1);
    }

    #[test]
    fn test_rule_skips_missing_data() {
        let store = ChannelStore::new(10);
        let book = RuleBook::new();
        book.upsert(temperature_rule("t", 0.0, Comparison::Higher));

        let evaluation = book.evaluate(&store);
        assert!(evaluation.alerts.is_empty());
        assert_eq!(evaluation.skipped, vec!["t".to_string()]);
    }

    #[test]
    fn test_disabled_rule_not_evaluated() {
        let store = ChannelStore::new(10);
        store.write(1, Utc::now(), [(Channel::Temperature, Value::Scalar(99.0))]);

        let book = RuleBook::new();
        book.upsert(temperature_rule("t", 0.0, Comparison::Higher).with_enabled(false));
        let evaluation = book.evaluate(&store);
        assert!(evaluation.alerts.is_empty());
        assert!(evaluation.skipped.is_empty());
    }

    #[test]
    fn test_one_enabled_rule_per_channel() {
        let book = RuleBook::new();
        book.upsert(temperature_rule("first", 10.0, Comparison::Higher));
        let outcome = book.upsert(temperature_rule("second", 20.0, Comparison::Higher));

        assert!(outcome.replaced.is_none());
        assert_eq!(outcome.superseded, vec!["first".to_string()]);
        assert!(!book.get("first").unwrap().enabled);
        assert!(book.get("second").unwrap().enabled);
        assert_eq!(book.len(), 2);

        let outcome = book.upsert(temperature_rule("second", 30.0, Comparison::Higher));
        assert_eq!(outcome.replaced.unwrap().threshold, 20.0);
        assert!(outcome.superseded.is_empty());
    }

    #[test]
    fn test_remove() {
        let book = RuleBook::new();
        book.upsert(temperature_rule("t", 0.0, Comparison::Higher));
        assert!(book.remove("t").is_some());
        assert!(book.remove("t").is_none());
        assert!(book.is_empty());
    }

    #[test]
    fn test_request_validation() {
        let req = RuleRequest {
            id: None,
            metric_id: "co2".to_string(),
            threshold: 1000.0,
            comparison: "Higher".to_string(),
            message: "CO2 high".to_string(),
            channels: vec!["telegram".to_string()],
            enabled: true,
        };
        let rule = AutomatedRule::try_from(req.clone()).unwrap();
        assert_eq!(rule.id, "co2");
        assert_eq!(rule.comparison, Comparison::Higher);

        let bad = RuleRequest {
            channels: vec!["pigeon".to_string()],
            ..req.clone()
        };
        assert_eq!(
            AutomatedRule::try_from(bad),
            Err(ValidationError::UnknownNotificationChannel("pigeon".to_string()))
        );

        let bad = RuleRequest {
            comparison: "equal".to_string(),
            ..req
        };
        assert!(matches!(
            AutomatedRule::try_from(bad),
            Err(ValidationError::InvalidComparison(_))
        ));
    }
}
