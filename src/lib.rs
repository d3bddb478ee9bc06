//! IPv4/IPv6 addresses, CIDR blocks and sets of CIDR blocks as plain values.
//!
//! ```
//! use martinellis::{Cidr, CidrSet};
//!
//! let mut set = CidrSet::new();
//! set.add("10.0.0.0/25".parse::<Cidr>()?)?;
//! set.add("10.0.0.128/25".parse::<Cidr>()?)?;
//! assert_eq!("10.0.0.0/24\n", set.to_string());
//! # Ok::<(), martinellis::Error>(())
//! ```

mod address;
mod cidr;
mod cidr_set;
mod count;
mod error;
mod range;

pub use crate::address::{Address, Version};
pub use crate::cidr::{Cidr, CidrIter, CidrRandomIter};
pub use crate::cidr_set::{CidrSet, RandomAddresses, SetOptions};
pub use crate::count::Count;
pub use crate::error::{Error, Result};
pub use crate::range::{xlongrange, xrandrange, RandomRange, XLongIter, XLongRange};
