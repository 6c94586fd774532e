use serde::{Deserialize, Serialize};

/// Capacity in which an account stakes collateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Agent,
    Validator,
    Platform,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Agent, Role::Validator, Role::Platform];
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Agent => "agent",
            Role::Validator => "validator",
            Role::Platform => "platform",
        };
        f.write_str(name)
    }
}
