//! Congruence-closure / E-matching internalization core.
//!
//! The entry point is [`internalize::Internalizer`], which walks a fresh
//! expression bottom-up, creates or reuses e-nodes, populates the congruence
//! table and head-index app map, registers parent links, and fires the
//! split-candidate / cast / theorem-activation hooks. All solver state lives
//! in a [`goal::Goal`], built from persistent containers so the surrounding
//! search can snapshot it by cloning.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

pub mod congr;
pub mod ematch;
pub mod error;
pub mod expr;
pub mod format;
pub mod global;
pub mod goal;
pub mod internalize;
pub mod types;

pub use error::{Error, Result};

const DEBUG: bool = cfg!(debug_assertions);

static VERBOSE: AtomicBool = AtomicBool::new(false);
pub fn verbose() -> bool { DEBUG && VERBOSE.load(std::sync::atomic::Ordering::SeqCst) }
pub fn set_verbose(b: bool) { VERBOSE.store(b, std::sync::atomic::Ordering::SeqCst) }

#[macro_export]
macro_rules! vprintln {
  ($($args:tt)*) => {
    if $crate::verbose() {
      eprintln!($($args)*)
    }
  };
}

#[allow(unused)]
#[macro_export]
macro_rules! vdbg {
  ($($args:tt)*) => {
    if $crate::verbose() {
      dbg!($($args)*)
    } else {
      ($($args)*)
    }
  };
}

static STATS: Lazy<Mutex<HashMap<&'static str, u32>>> = Lazy::new(Default::default);

pub fn stat(s: &'static str) { *STATS.lock().unwrap().entry(s).or_default() += 1 }

pub fn print_stats() {
  let g = STATS.lock().unwrap();
  let mut vec: Vec<_> = g.iter().collect();
  vec.sort();
  for (s, i) in vec {
    println!("{s}: {i}");
  }
}

/// Solver configuration. Owned by [`global::Global`]; every flag is read by
/// the internalizer, none are mutated after construction.
#[derive(Clone, Debug)]
pub struct Config {
  /// Master gate for case-split candidate detection.
  pub splits: bool,
  /// Register `ite`/`dite` conditions as split candidates.
  pub split_ite: bool,
  /// Register stuck matcher applications as split candidates.
  pub split_match: bool,
  /// Compare function types before reporting a cross-symbol congruence.
  pub check_congr_types: bool,
  /// Report soft issues (unassigned metavariables, spurious congruences).
  pub report_issues: bool,
  /// Internalization recursion limit; exceeding it is a recoverable error.
  pub max_rec_depth: u32,

  pub trace_congr: bool,
  pub trace_split: bool,
  pub trace_activation: bool,
  pub trace_eqs: bool,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      splits: true,
      split_ite: true,
      split_match: true,
      check_congr_types: true,
      report_issues: true,
      max_rec_depth: 512,
      trace_congr: DEBUG,
      trace_split: DEBUG,
      trace_activation: DEBUG,
      trace_eqs: DEBUG,
    }
  }
}
