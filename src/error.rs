//! Recoverable errors (tier 2 of the error taxonomy).
//!
//! Caller-contract violations (bound variables, metadata, or kernel
//! projections reaching the internalizer) are not represented here; they are
//! `panic!`/`unreachable!` because continuing would corrupt the congruence
//! invariants. Soft diagnostics go through `Goal::report_issue` and never
//! abort.

use crate::expr::NameId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
  /// The internalization recursion exceeded `Config::max_rec_depth`.
  MaxRecDepth,
  /// A constant was referenced that the environment does not know.
  UnknownConstant(NameId),
  /// Type inference hit a term the simplified host typing cannot assign.
  IllTyped,
}

impl std::fmt::Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Error::MaxRecDepth => write!(f, "maximum recursion depth has been reached"),
      Error::UnknownConstant(n) => write!(f, "unknown constant (name #{})", n.0),
      Error::IllTyped => write!(f, "type inference failed"),
    }
  }
}

impl std::error::Error for Error {}
