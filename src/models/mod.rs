pub mod compliance;
pub mod condition;
pub mod configuration_policy;
pub mod operator_policy;

pub use compliance::*;
pub use condition::*;
pub use configuration_policy::{
    ConfigurationPolicy, ConfigurationPolicySpec, ConfigurationPolicyStatus, NamespaceSelector,
    ObjectTemplate, TemplateStatus,
};
pub use operator_policy::{
    OperatorPolicy, OperatorPolicySpec, OperatorPolicyStatus, RemovalBehaviorSpec,
};
