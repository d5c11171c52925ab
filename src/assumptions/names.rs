//! Canonical assumption names

// Growth
pub const INITIAL_USERS: &str = "initial_users";
pub const GROWTH_RATE: &str = "growth_rate";
pub const TAM: &str = "tam";
pub const SATURATION: &str = "saturation";

// Loan book
pub const AVERAGE_LOAN_SIZE: &str = "average_loan_size";
pub const REPEAT_BORROW_RATE: &str = "repeat_borrow_rate";
pub const LOAN_TERM: &str = "loan_term";
pub const DEFAULT_RATE_BASE: &str = "default_rate_base";
pub const FRAUD_REDUCTION_FRACTION: &str = "fraud_reduction_fraction";
pub const RECOVERY_RATE: &str = "recovery_rate";

// Capital & yield
pub const INITIAL_CAPITAL: &str = "initial_capital";
pub const CAPITAL_INFLOW_RATE: &str = "capital_inflow_rate";
pub const CAPITAL_WITHDRAWAL_RATE: &str = "capital_withdrawal_rate";
pub const YIELD_RATE: &str = "yield_rate";

// Revenue
pub const INTEREST_SPREAD: &str = "interest_spread";
pub const FEE_RATE: &str = "fee_rate";

// Unit economics
pub const PLATFORM_REVENUE_SHARE: &str = "platform_revenue_share";
pub const LOAN_TERM_DAYS: &str = "loan_term_days";
pub const PAYDAY_FEE_PER_100: &str = "payday_fee_per_100";
