//! Distortion policy: declarative, per-target customization of interception.
//!
//! A distortion selects which of the thirteen primitive operations remain
//! active for a matched target and how the default forwarding path is
//! altered (key visibility, local storage, argument truncation). Rules match
//! by exact value, by category, or by predicate, in that order; the first
//! match wins, and a match may explicitly stop further matching with no
//! distortion at all.
//!
//! The configuration record is the sole boundary contract between external
//! tooling and the core: a versioned serde structure, nothing else crosses.
//!
//! # Citations
//! - Miller, "Robust Composition" (2006), Chapter 9 – attenuated authority
//! - Lawvere, "Functorial semantics of algebraic theories" (1963) – policy
//!   objects as declarative specifications of permitted operations

use crate::value::{GraphKey, ObjId, ObjectKind, PropKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Format tag carried by every configuration record.
pub const CONFIG_FORMAT: &str = "osmose-distortion";
/// Current configuration schema version.
pub const CONFIG_VERSION: &str = "1.0";

/// The thirteen primitive operations subject to interception.
///
/// This set is fixed and closed; every surrogate supports exactly these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Read,
    Write,
    Delete,
    Enumerate,
    GetDescriptor,
    DefineDescriptor,
    ReadPrototype,
    WritePrototype,
    IsExtensible,
    PreventExtensions,
    Invoke,
    Construct,
    Has,
}

/// All thirteen operations, in spec order.
pub const ALL_OPS: [OpKind; 13] = [
    OpKind::Read,
    OpKind::Write,
    OpKind::Delete,
    OpKind::Enumerate,
    OpKind::GetDescriptor,
    OpKind::DefineDescriptor,
    OpKind::ReadPrototype,
    OpKind::WritePrototype,
    OpKind::IsExtensible,
    OpKind::PreventExtensions,
    OpKind::Invoke,
    OpKind::Construct,
    OpKind::Has,
];

/// Call-argument truncation policy for invocable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgTruncation {
    /// Arguments pass through untouched.
    NoTruncation,
    /// Argument lists longer than the limit are cut.
    Limit(usize),
}

impl Default for ArgTruncation {
    fn default() -> Self {
        ArgTruncation::NoTruncation
    }
}

fn default_format() -> String {
    CONFIG_FORMAT.to_string()
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

fn default_active_ops() -> Vec<OpKind> {
    ALL_OPS.to_vec()
}

/// Declarative distortion configuration for one matched target.
///
/// Produced by external configuration tooling, consumed by the forwarding
/// path. Operations absent from `active_ops` are hard-denied rather than
/// forwarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortionConfig {
    /// Format tag, `osmose-distortion`.
    #[serde(default = "default_format")]
    pub format: String,
    /// Schema version tag.
    #[serde(default = "default_version")]
    pub version: String,
    /// Operations that remain live. Everything else is denied.
    #[serde(default = "default_active_ops")]
    pub active_ops: Vec<OpKind>,
    /// Own-key visibility filter: `None` means no filtering, `Some` is an
    /// explicit ordered whitelist applied to enumeration, membership tests
    /// and descriptor queries.
    #[serde(default)]
    pub key_filter: Option<Vec<PropKey>>,
    /// Writes to keys unknown to the real value stay local to the surrogate.
    #[serde(default)]
    pub local_writes: bool,
    /// Deletions never reach the real value; they only hide keys locally.
    #[serde(default)]
    pub local_deletes: bool,
    /// Force surrogate use even when a conversion could be avoided.
    #[serde(default)]
    pub force_surrogate: bool,
    /// Argument truncation for invocable targets.
    #[serde(default)]
    pub truncate_args: ArgTruncation,
}

impl Default for DistortionConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            version: default_version(),
            active_ops: default_active_ops(),
            key_filter: None,
            local_writes: false,
            local_deletes: false,
            force_surrogate: false,
            truncate_args: ArgTruncation::NoTruncation,
        }
    }
}

impl DistortionConfig {
    /// Configuration with only the given operations active.
    pub fn with_ops(ops: impl IntoIterator<Item = OpKind>) -> Self {
        Self {
            active_ops: ops.into_iter().collect(),
            ..Self::default()
        }
    }

    /// `true` if the operation is in the active set.
    #[inline]
    pub fn allows(&self, op: OpKind) -> bool {
        self.active_ops.contains(&op)
    }

    /// A key filter combined with disallowing local add/delete can
    /// desynchronize the surrogate's reported shape from a non-extensible
    /// real value's fixed shape.
    pub fn has_unsafe_key_filter(&self) -> bool {
        self.key_filter.is_some() && !(self.local_writes && self.local_deletes)
    }
}

/// Metadata describing one intercepted operation, handed to rule matching.
#[derive(Debug, Clone)]
pub struct OperationMeta {
    /// Which primitive operation is being performed.
    pub op: OpKind,
    /// The real value behind the surrogate.
    pub target: ObjId,
    /// The real value's category tag.
    pub category: ObjectKind,
    /// Destination graph performing the operation.
    pub graph: GraphKey,
}

/// How a rule matches operation metadata.
#[derive(Clone)]
pub enum RuleMatcher {
    /// Exact real value.
    ByValue(ObjId),
    /// Category tag (the prototype-level grouping of this object model).
    ByCategory(ObjectKind),
    /// Arbitrary predicate over the operation metadata.
    ByPredicate(Rc<dyn Fn(&OperationMeta) -> bool>),
}

impl RuleMatcher {
    fn matches(&self, meta: &OperationMeta) -> bool {
        match self {
            RuleMatcher::ByValue(v) => *v == meta.target,
            RuleMatcher::ByCategory(k) => *k == meta.category,
            RuleMatcher::ByPredicate(p) => p(meta),
        }
    }
}

impl fmt::Debug for RuleMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleMatcher::ByValue(v) => write!(f, "ByValue({v})"),
            RuleMatcher::ByCategory(k) => write!(f, "ByCategory({k:?})"),
            RuleMatcher::ByPredicate(_) => write!(f, "ByPredicate(..)"),
        }
    }
}

/// What a matched rule does.
#[derive(Debug, Clone)]
pub enum RuleAction {
    /// Apply this configuration.
    Apply(DistortionConfig),
    /// Stop matching with no distortion: the operation proceeds through
    /// default forwarding.
    Stop,
}

#[derive(Debug, Clone)]
struct DistortionRule {
    matcher: RuleMatcher,
    action: RuleAction,
}

/// Non-fatal findings recorded at rule registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyWarning {
    /// Key filter without local add/delete: surrogate shape can drift from a
    /// non-extensible real value and violate a host invariant at
    /// enumeration time.
    UnsafeKeyFilter,
}

impl fmt::Display for PolicyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyWarning::UnsafeKeyFilter => write!(
                f,
                "key-visibility filter without local writes/deletes can \
                 desynchronize surrogate shape from a non-extensible target"
            ),
        }
    }
}

/// Ordered rule store: exact value, then category, then predicate.
#[derive(Debug, Default)]
pub struct DistortionPolicy {
    value_rules: Vec<DistortionRule>,
    category_rules: Vec<DistortionRule>,
    predicate_rules: Vec<DistortionRule>,
    warnings: Vec<PolicyWarning>,
}

impl DistortionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule. Within its category bucket, registration order is
    /// matching order.
    pub fn add_rule(&mut self, matcher: RuleMatcher, action: RuleAction) {
        if let RuleAction::Apply(cfg) = &action {
            if cfg.has_unsafe_key_filter() {
                tracing::warn!(
                    matcher = ?matcher,
                    "unsafe configuration: {}",
                    PolicyWarning::UnsafeKeyFilter
                );
                self.warnings.push(PolicyWarning::UnsafeKeyFilter);
            }
        }
        let rule = DistortionRule { matcher, action };
        match &rule.matcher {
            RuleMatcher::ByValue(_) => self.value_rules.push(rule),
            RuleMatcher::ByCategory(_) => self.category_rules.push(rule),
            RuleMatcher::ByPredicate(_) => self.predicate_rules.push(rule),
        }
    }

    /// Applies the same configuration to every element of a collection.
    pub fn add_rules_elementwise(
        &mut self,
        values: impl IntoIterator<Item = ObjId>,
        config: DistortionConfig,
    ) {
        for v in values {
            self.add_rule(RuleMatcher::ByValue(v), RuleAction::Apply(config.clone()));
        }
    }

    /// Finds the configuration for an operation, if any.
    ///
    /// Category order is fixed: exact value, then category, then predicate.
    /// The first matching rule ends the search; a `Stop` match ends it with
    /// no distortion.
    pub fn resolve(&self, meta: &OperationMeta) -> Option<&DistortionConfig> {
        for bucket in [&self.value_rules, &self.category_rules, &self.predicate_rules] {
            for rule in bucket {
                if rule.matcher.matches(meta) {
                    return match &rule.action {
                        RuleAction::Apply(cfg) => Some(cfg),
                        RuleAction::Stop => None,
                    };
                }
            }
        }
        None
    }

    /// Warnings accumulated at registration time.
    pub fn warnings(&self) -> &[PolicyWarning] {
        &self.warnings
    }

    /// Total number of registered rules.
    pub fn rule_count(&self) -> usize {
        self.value_rules.len() + self.category_rules.len() + self.predicate_rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(op: OpKind, target: ObjId, category: ObjectKind) -> OperationMeta {
        OperationMeta {
            op,
            target,
            category,
            graph: GraphKey::name("wet"),
        }
    }

    #[test]
    fn match_order_is_value_then_category_then_predicate() {
        let target = ObjId::new(3);
        let mut policy = DistortionPolicy::new();
        policy.add_rule(
            RuleMatcher::ByPredicate(Rc::new(|_| true)),
            RuleAction::Apply(DistortionConfig::with_ops([OpKind::Has])),
        );
        policy.add_rule(
            RuleMatcher::ByCategory(ObjectKind::Plain),
            RuleAction::Apply(DistortionConfig::with_ops([OpKind::Read])),
        );
        policy.add_rule(
            RuleMatcher::ByValue(target),
            RuleAction::Apply(DistortionConfig::with_ops([OpKind::Write])),
        );

        let cfg = policy
            .resolve(&meta(OpKind::Read, target, ObjectKind::Plain))
            .unwrap();
        assert_eq!(cfg.active_ops, vec![OpKind::Write]);

        // A different value falls through to the category rule.
        let cfg = policy
            .resolve(&meta(OpKind::Read, ObjId::new(9), ObjectKind::Plain))
            .unwrap();
        assert_eq!(cfg.active_ops, vec![OpKind::Read]);

        // A different category falls through to the predicate rule.
        let cfg = policy
            .resolve(&meta(OpKind::Read, ObjId::new(9), ObjectKind::Callable))
            .unwrap();
        assert_eq!(cfg.active_ops, vec![OpKind::Has]);
    }

    #[test]
    fn stop_ends_matching_with_no_distortion() {
        let target = ObjId::new(3);
        let mut policy = DistortionPolicy::new();
        policy.add_rule(RuleMatcher::ByValue(target), RuleAction::Stop);
        policy.add_rule(
            RuleMatcher::ByCategory(ObjectKind::Plain),
            RuleAction::Apply(DistortionConfig::with_ops([OpKind::Read])),
        );
        assert!(policy
            .resolve(&meta(OpKind::Read, target, ObjectKind::Plain))
            .is_none());
    }

    #[test]
    fn no_match_means_no_distortion() {
        let policy = DistortionPolicy::new();
        assert!(policy
            .resolve(&meta(OpKind::Read, ObjId::new(1), ObjectKind::Plain))
            .is_none());
    }

    #[test]
    fn elementwise_applies_to_each_value() {
        let mut policy = DistortionPolicy::new();
        let cfg = DistortionConfig::with_ops([OpKind::Read]);
        policy.add_rules_elementwise([ObjId::new(1), ObjId::new(2)], cfg);
        assert_eq!(policy.rule_count(), 2);
        assert!(policy
            .resolve(&meta(OpKind::Read, ObjId::new(2), ObjectKind::Plain))
            .is_some());
    }

    #[test]
    fn unsafe_key_filter_is_flagged_not_rejected() {
        let mut policy = DistortionPolicy::new();
        let cfg = DistortionConfig {
            key_filter: Some(vec![PropKey::name("x")]),
            ..DistortionConfig::default()
        };
        policy.add_rule(RuleMatcher::ByValue(ObjId::new(1)), RuleAction::Apply(cfg));
        assert_eq!(policy.warnings(), &[PolicyWarning::UnsafeKeyFilter]);
        assert_eq!(policy.rule_count(), 1);

        // With local storage both ways the combination is safe.
        let mut policy = DistortionPolicy::new();
        let cfg = DistortionConfig {
            key_filter: Some(vec![PropKey::name("x")]),
            local_writes: true,
            local_deletes: true,
            ..DistortionConfig::default()
        };
        policy.add_rule(RuleMatcher::ByValue(ObjId::new(1)), RuleAction::Apply(cfg));
        assert!(policy.warnings().is_empty());
    }

    #[test]
    fn config_record_round_trips_with_defaults() {
        let json = r#"{
            "active_ops": ["read", "has"],
            "key_filter": ["x", 0],
            "truncate_args": { "limit": 2 }
        }"#;
        let cfg: DistortionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.format, CONFIG_FORMAT);
        assert_eq!(cfg.version, CONFIG_VERSION);
        assert_eq!(cfg.active_ops, vec![OpKind::Read, OpKind::Has]);
        assert_eq!(
            cfg.key_filter,
            Some(vec![PropKey::name("x"), PropKey::Index(0)])
        );
        assert!(!cfg.local_writes);
        assert_eq!(cfg.truncate_args, ArgTruncation::Limit(2));
        assert!(cfg.allows(OpKind::Read));
        assert!(!cfg.allows(OpKind::Write));

        let back = serde_json::to_string(&cfg).unwrap();
        let again: DistortionConfig = serde_json::from_str(&back).unwrap();
        assert_eq!(cfg, again);
    }

    #[test]
    fn empty_record_means_everything_active() {
        let cfg: DistortionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.active_ops.len(), 13);
        for op in ALL_OPS {
            assert!(cfg.allows(op));
        }
    }
}
