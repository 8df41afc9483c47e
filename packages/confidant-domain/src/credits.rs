use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use confidant_config::Allowances;

/// Subscription plan attached to a credit account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
	Free,
	Pro,
	Premium,
	/// Never debited.
	Demo,
}
impl Plan {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Free => "free",
			Self::Pro => "pro",
			Self::Premium => "premium",
			Self::Demo => "demo",
		}
	}

	pub fn is_unlimited(self) -> bool {
		matches!(self, Self::Demo)
	}

	/// Starting balance for a newly opened account, `None` when unlimited.
	pub fn allowance(self, allowances: &Allowances) -> Option<i64> {
		match self {
			Self::Free => Some(allowances.free),
			Self::Pro => Some(allowances.pro),
			Self::Premium => Some(allowances.premium),
			Self::Demo => None,
		}
	}
}
impl fmt::Display for Plan {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Plan {
	type Err = UnknownPlan;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"free" => Ok(Self::Free),
			"pro" => Ok(Self::Pro),
			"premium" => Ok(Self::Premium),
			"demo" => Ok(Self::Demo),
			_ => Err(UnknownPlan(raw.to_string())),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown plan {0:?}.")]
pub struct UnknownPlan(pub String);

/// Balance snapshot returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditBalance {
	pub plan: Plan,
	/// `None` for unlimited plans.
	pub remaining: Option<i64>,
}
