mod decimal;
mod holder;
mod id;
mod identity;
mod token;
mod transaction;

pub use decimal::{deserialize_decimal_lenient, parse_decimal_lenient};
pub use holder::{AssetHolding, Holder};
pub use id::Id;
pub use identity::{Identity, Profile, Role};
pub use token::{Symbol, TokenDescriptor};
pub use transaction::{CommissionFee, Transaction, TransactionStatus};
