//! Congruence table and head-index app map.
//!
//! The table maps a congruence signature (head root + argument roots) to the
//! first application seen with that signature. Keys are computed against the
//! union-find state at insertion time; after a union, affected parents are
//! re-inserted by [`drain_eqs`], so stale entries are never *found* (a fresh
//! key only ever contains current roots) and need not be deleted.

use crate::expr::ExprId;
use crate::global::Global;
use crate::goal::{Goal, Proof};
use crate::{stat, vprintln, Result};
use itertools::Itertools;

/// Congruence signature of an application: the class of its head and the
/// classes of its arguments. Subterms left uninternalized on purpose (`ite`
/// branches) enter by their own identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CongrKey {
  head: ExprId,
  args: Vec<ExprId>,
}

/// Signature arguments of `e`, each replaced by its class root.
fn sig_args(g: &Global, goal: &Goal, e: ExprId) -> Vec<ExprId> {
  g.exprs.get_app_args(e).into_iter().map(|a| goal.root_of(a)).collect()
}

pub fn congr_key(g: &Global, goal: &Goal, e: ExprId) -> CongrKey {
  CongrKey { head: goal.root_of(g.exprs.get_app_fn(e)), args: sig_args(g, goal, e) }
}

/// Full congruence check: same-class heads and pointwise same-class
/// signature arguments.
pub fn is_congruent(g: &Global, goal: &Goal, a: ExprId, b: ExprId) -> bool {
  goal.is_same_root(g.exprs.get_app_fn(a), g.exprs.get_app_fn(b))
    && sig_args(g, goal, a) == sig_args(g, goal, b)
}

/// Insert `e` into the congruence table, or detect a congruence with the
/// application already holding its signature. On detection the equation is
/// queued (the union happens when the queue is drained) and the new node's
/// proof-forest edge is pointed at the old term; the old term stays the
/// table entry (first-inserted-wins).
pub fn add_congr_table(g: &Global, goal: &mut Goal, e: ExprId) -> Result<()> {
  if goal.get_enode(e).is_some_and(|n| n.interpreted) {
    return Ok(())
  }
  let key = congr_key(g, goal, e);
  let Some(&old) = goal.congr_table.get(&key) else {
    goal.congr_table.insert(key, e);
    return Ok(())
  };
  if old == e || !is_congruent(g, goal, e, old) {
    // re-internalization, or a stale entry left behind by a union;
    // refresh the representative in the latter case
    if old != e {
      goal.congr_table.insert(key, e);
    }
    return Ok(())
  }
  let (fa, fb) = (g.exprs.get_app_fn(e), g.exprs.get_app_fn(old));
  if fa != fb && g.cfg.check_congr_types && !g.has_same_type(fa, fb)? {
    // Distinct head symbols whose classes merged but whose types differ:
    // not a usable congruence. Surfaced as a diagnostic, never an error.
    if g.cfg.report_issues {
      goal.report_issue(format!(
        "spurious congruence candidate between `{}` and `{}`",
        g.pp(e),
        g.pp(old)
      ));
    }
    return Ok(())
  }
  if g.cfg.trace_congr {
    vprintln!("found congruence between `{}` and `{}`", g.pp(e), g.pp(old));
  }
  stat("congruence");
  if let Some(n) = goal.enodes.get_mut(&e) {
    n.target = Some(old);
    n.proof = Some(Proof::Congr);
  }
  goal.push_eq_core(e, old, Proof::Congr, false);
  Ok(())
}

/// Record `e` as a witness application for its head. Purely diagnostic /
/// split-candidate bookkeeping; a missing entry never affects correctness.
pub fn update_app_map(g: &Global, goal: &mut Goal, e: ExprId) {
  let hi = g.exprs.to_head_index(e);
  let mut bucket = goal.app_map.get(&hi).cloned().unwrap_or_default();
  bucket.insert(0, e);
  goal.app_map.insert(hi, bucket);
}

/// Drain the equation queue: perform the deferred unions and re-run
/// congruence detection on the parents of every absorbed class, which may
/// queue further equations until a fixpoint is reached.
pub fn drain_eqs(g: &Global, goal: &mut Goal) -> Result<()> {
  while let Some(eq) = goal.pop_eq() {
    if g.cfg.trace_eqs {
      vprintln!("eq: `{}` {} `{}`", g.pp(eq.lhs), if eq.is_heq { "≍" } else { "=" }, g.pp(eq.rhs));
    }
    if eq.lhs == eq.rhs {
      continue
    }
    let Some(parents) = goal.union_roots(eq.lhs, eq.rhs, eq.is_heq) else { continue };
    for p in parents.into_iter().unique() {
      if goal.already_internalized(p) {
        add_congr_table(g, goal, p)?
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::{Expr, ExprId};
  use crate::global::Global;
  use crate::goal::Goal;
  use crate::Config;

  fn mk_fn(g: &mut Global, name: &str, ty: Option<ExprId>) -> ExprId {
    let n = g.add_const(name, ty);
    g.exprs.mk_const(n)
  }

  fn mk_all(goal: &mut Goal, es: &[ExprId]) {
    for &e in es {
      goal.mk_enode(e, 0, false, false);
    }
  }

  #[test]
  fn congruence_found_after_union() {
    let mut g = Global::new(Config::default());
    let nat = g.exprs.mk_const(g.known.nat);
    let fty = g.exprs.mk(Expr::Pi { ty: nat, body: nat });
    let f = mk_fn(&mut g, "f", Some(fty));
    let (a, b) = (g.mk_fvar(nat), g.mk_fvar(nat));
    let (fa, fb) = (g.exprs.mk_app(f, a), g.exprs.mk_app(f, b));
    let mut goal = Goal::new();
    mk_all(&mut goal, &[f, a, b, fa, fb]);
    goal.register_parent(fa, a);
    goal.register_parent(fb, b);
    add_congr_table(&g, &mut goal, fa).unwrap();
    add_congr_table(&g, &mut goal, fb).unwrap();
    // distinct argument classes: no congruence yet
    assert!(goal.new_eqs.is_empty());
    goal.push_eq(a, b, Proof::Refl);
    drain_eqs(&g, &mut goal).unwrap();
    assert!(goal.is_same_root(fa, fb));
  }

  #[test]
  fn first_inserted_wins() {
    let mut g = Global::new(Config::default());
    let nat = g.exprs.mk_const(g.known.nat);
    let fty = g.exprs.mk(Expr::Pi { ty: nat, body: nat });
    let f = mk_fn(&mut g, "f", Some(fty));
    let (a, b) = (g.mk_fvar(nat), g.mk_fvar(nat));
    let (fa, fb) = (g.exprs.mk_app(f, a), g.exprs.mk_app(f, b));
    let mut goal = Goal::new();
    mk_all(&mut goal, &[f, a, b, fa, fb]);
    goal.union_roots(a, b, false);
    add_congr_table(&g, &mut goal, fa).unwrap();
    add_congr_table(&g, &mut goal, fb).unwrap();
    // fb is congruent to fa; the table keeps fa and the proof edge of fb
    // points back at it
    let key = congr_key(&g, &goal, fb);
    assert_eq!(goal.congr_table.get(&key), Some(&fa));
    assert_eq!(goal.get_enode(fb).unwrap().target, Some(fa));
    assert_eq!(goal.new_eqs.len(), 1);
  }

  #[test]
  fn cross_symbol_type_mismatch_is_diagnostic_only() {
    let mut g = Global::new(Config::default());
    let nat = g.exprs.mk_const(g.known.nat);
    let prop = g.exprs.mk_sort(0);
    let fty = g.exprs.mk(Expr::Pi { ty: nat, body: nat });
    let hty = g.exprs.mk(Expr::Pi { ty: nat, body: prop });
    let f = mk_fn(&mut g, "f", Some(fty));
    let h = mk_fn(&mut g, "h", Some(hty));
    let a = g.mk_fvar(nat);
    let (fa, ha) = (g.exprs.mk_app(f, a), g.exprs.mk_app(h, a));
    let mut goal = Goal::new();
    mk_all(&mut goal, &[f, h, a, fa, ha]);
    // the driver asserted f = h (so their classes merge), but their types
    // disagree: the congruence must be refused and reported
    goal.union_roots(f, h, false);
    add_congr_table(&g, &mut goal, fa).unwrap();
    add_congr_table(&g, &mut goal, ha).unwrap();
    assert!(goal.new_eqs.is_empty());
    assert_eq!(goal.issues.len(), 1);
    assert!(!goal.is_same_root(fa, ha));
  }

  #[test]
  fn cross_symbol_same_type_congruence_fires() {
    let mut g = Global::new(Config::default());
    let nat = g.exprs.mk_const(g.known.nat);
    let fty = g.exprs.mk(Expr::Pi { ty: nat, body: nat });
    let f = mk_fn(&mut g, "f", Some(fty));
    let h = mk_fn(&mut g, "h", Some(fty));
    let a = g.mk_fvar(nat);
    let (fa, ha) = (g.exprs.mk_app(f, a), g.exprs.mk_app(h, a));
    let mut goal = Goal::new();
    mk_all(&mut goal, &[f, h, a, fa, ha]);
    goal.register_parent(fa, f);
    goal.register_parent(ha, h);
    add_congr_table(&g, &mut goal, fa).unwrap();
    add_congr_table(&g, &mut goal, ha).unwrap();
    assert!(goal.new_eqs.is_empty());
    goal.push_eq(f, h, Proof::Refl);
    drain_eqs(&g, &mut goal).unwrap();
    assert!(goal.is_same_root(fa, ha));
    assert!(goal.issues.is_empty());
  }

  #[test]
  fn app_map_prepends_witnesses() {
    let mut g = Global::new(Config::default());
    let f = mk_fn(&mut g, "f", None);
    let (a, b) = (g.exprs.mk_nat(1), g.exprs.mk_nat(2));
    let (fa, fb) = (g.exprs.mk_app(f, a), g.exprs.mk_app(f, b));
    let mut goal = Goal::new();
    update_app_map(&g, &mut goal, fa);
    update_app_map(&g, &mut goal, fb);
    let hi = g.exprs.to_head_index(fa);
    assert_eq!(goal.app_map.get(&hi).unwrap(), &vec![fb, fa]);
  }
}
