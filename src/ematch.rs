//! E-matching theorem bookkeeping: pattern internalization, match-condition
//! wrappers, and activation of theorems parked on matcher constants.
//!
//! The matching loop itself runs downstream; this module guarantees that by
//! the time a theorem is active, every ground subterm of its patterns has an
//! e-node, so candidate enumeration can go straight to the app map.

use crate::expr::{Expr, ExprId, FVarId, NameId};
use crate::global::{ConstKind, Global};
use crate::goal::{Goal, Proof};
use crate::internalize::Internalizer;
use crate::{stat, vprintln, Result};
use itertools::Itertools;

/// Where a theorem came from; the key under which it can be parked while
/// waiting for its matcher to appear.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
  /// A global declaration (match-equation lemma, annotated theorem).
  Decl(NameId),
  /// A local hypothesis.
  Local(FVarId),
}

#[derive(Clone, Debug)]
pub struct EMatchTheorem {
  pub origin: Origin,
  /// Proof term, opaque to this core.
  pub proof: ExprId,
  /// Multi-patterns: bound variables stand for the theorem's parameters,
  /// ground subterms are wrapped in the ground-pattern marker.
  pub patterns: Vec<ExprId>,
  pub num_params: u32,
}

impl Goal {
  /// Park a theorem until the matcher behind `origin` is internalized.
  pub fn add_pending_theorem(&mut self, origin: Origin, thm: EMatchTheorem) {
    let mut bucket = self.pending_thms.get(&origin).cloned().unwrap_or_default();
    bucket.push(thm);
    self.pending_thms.insert(origin, bucket);
  }
}

/// The payload of a ground-pattern marker application, if `pat` is one.
fn ground_of(g: &Global, pat: ExprId) -> Option<ExprId> {
  if g.exprs.app_head_const(pat) == Some(g.known.ground_pattern) {
    g.exprs.get_app_args(pat).last().copied()
  } else {
    None
  }
}

/// Normalize a ground pattern payload: erase metadata, unfold reducible
/// constants, and contract beta redexes, everywhere in the tree. Idempotent
/// as long as reducible unfoldings are themselves normal.
fn preprocess_ground_pattern(g: &Global, e: ExprId) -> ExprId {
  match g.exprs.get(e) {
    Expr::MData(x) => preprocess_ground_pattern(g, x),
    Expr::Const(n) => match g.get_const_info(n).ok().map(|c| &c.kind) {
      Some(&ConstKind::Reducible(unf)) => preprocess_ground_pattern(g, unf),
      _ => e,
    },
    Expr::App(..) => {
      let f = preprocess_ground_pattern(g, g.exprs.get_app_fn(e));
      let args: Vec<_> =
        g.exprs.get_app_args(e).into_iter().map(|a| preprocess_ground_pattern(g, a)).collect();
      let e2 = g.exprs.mk_app_spine(f, &args);
      let e3 = g.exprs.beta_reduce(e2);
      if e3 != e2 {
        preprocess_ground_pattern(g, e3)
      } else {
        e3
      }
    }
    Expr::Lam { ty, body } => {
      let (ty2, body2) = (preprocess_ground_pattern(g, ty), preprocess_ground_pattern(g, body));
      g.exprs.mk(Expr::Lam { ty: ty2, body: body2 })
    }
    Expr::Pi { ty, body } => {
      let (ty2, body2) = (preprocess_ground_pattern(g, ty), preprocess_ground_pattern(g, body));
      g.exprs.mk(Expr::Pi { ty: ty2, body: body2 })
    }
    Expr::Proj(n, i, x) => {
      let x2 = preprocess_ground_pattern(g, x);
      g.exprs.mk(Expr::Proj(n, i, x2))
    }
    _ => e,
  }
}

/// Decompose an equation or heterogeneous equation into (lhs, rhs).
fn decompose_eq(g: &Global, e: ExprId) -> Option<(ExprId, ExprId)> {
  if g.exprs.is_app_of(e, g.known.eq, 3) {
    let a = g.exprs.get_app_args(e);
    Some((a[1], a[2]))
  } else if g.exprs.is_app_of(e, g.known.heq, 4) {
    let a = g.exprs.get_app_args(e);
    Some((a[1], a[3]))
  } else {
    None
  }
}

/// Closed left-hand sides of the equations in a match-condition body, which
/// is a chain `lhs₁ = rhs₁ → … → lhsₙ = rhsₙ → conclusion`.
fn collect_match_cond_lhss(g: &Global, e: ExprId) -> Vec<ExprId> {
  fn walk(g: &Global, e: ExprId, out: &mut Vec<ExprId>) {
    if let Some((l, _)) = decompose_eq(g, e) {
      if !g.exprs.has_loose_bvars(l) && !out.contains(&l) {
        out.push(l)
      }
      return
    }
    if let Expr::Pi { ty, body } = g.exprs.get(e) {
      walk(g, ty, out);
      walk(g, body, out)
    }
  }
  let mut out = vec![];
  walk(g, e, &mut out);
  out
}

impl Internalizer<'_> {
  /// Internalize one pattern: bound variables (theorem parameters) and the
  /// don't-care marker pass through, ground payloads are preprocessed and
  /// internalized, and application spines are rebuilt around the results.
  pub fn internalize_pattern(&mut self, pat: ExprId, gen: u32) -> Result<ExprId> {
    let k = &self.g.known;
    match self.g.exprs.get(pat) {
      Expr::BVar(_) => Ok(pat),
      Expr::Const(n) if n == k.dontcare => Ok(pat),
      Expr::App(..) if self.g.exprs.app_head_const(pat) == Some(k.ground_pattern) => {
        let gr = *self.g.exprs.get_app_args(pat).last().unwrap();
        let gr = preprocess_ground_pattern(self.g, gr);
        self.internalize(gr, gen, None)?;
        let head = self.g.exprs.mk_const(k.ground_pattern);
        Ok(self.g.exprs.mk_app(head, gr))
      }
      Expr::App(..) => {
        let f = self.g.exprs.get_app_fn(pat);
        let mut args = self.g.exprs.get_app_args(pat);
        for a in &mut args {
          *a = self.internalize_pattern(*a, gen)?
        }
        Ok(self.g.exprs.mk_app_spine(f, &args))
      }
      _ => Ok(pat),
    }
  }

  /// A `MatchCond` wrapper: interpreted (no congruence), but the closed
  /// left-hand sides of its equations are internalized so the condition can
  /// be discharged by the closure. A single-equation condition is propagated
  /// as the equation itself.
  pub fn internalize_match_cond(&mut self, e: ExprId, gen: u32) -> Result<()> {
    self.goal.mk_enode(e, gen, true, false);
    let args = self.g.exprs.get_app_args(e);
    let Some(&body) = args.last() else { return Ok(()) };
    let lhss = collect_match_cond_lhss(self.g, body);
    for &lhs in &lhss {
      self.internalize(lhs, gen, Some(e))?;
      self.goal.register_parent(e, lhs)
    }
    if let [lhs] = lhss[..] {
      if let Some((l, r)) = decompose_eq(self.g, body) {
        if l == lhs && !self.g.exprs.has_loose_bvars(r) {
          self.internalize(r, gen, Some(e))?;
          self.goal.register_parent(e, r);
          self.goal.push_eq(l, r, Proof::Opaque(e));
          stat("match_cond_eq");
          return Ok(())
        }
      }
    }
    self.goal.push_refl_eq(e);
    Ok(())
  }

  /// Make a theorem active: internalize its patterns and append it to the
  /// active set the matching loop consumes.
  pub fn activate_theorem(&mut self, mut thm: EMatchTheorem, gen: u32) -> Result<()> {
    for p in &mut thm.patterns {
      *p = self.internalize_pattern(*p, gen)?
    }
    if self.g.cfg.trace_activation {
      vprintln!(
        "activated {:?}: {}",
        thm.origin,
        thm.patterns.iter().map(|&p| format!("`{}`", self.g.pp(p))).format(", ")
      );
    }
    self.goal.active_thms.push_back(thm);
    stat("activate_thm");
    Ok(())
  }

  /// Activate every theorem parked under `origin`, dropping erased lemmas
  /// and the pattern slots the matcher application already fixes.
  pub fn activate_theorem_patterns(
    &mut self, origin: &Origin, matcher_args: &[ExprId], gen: u32,
  ) -> Result<()> {
    let Some(thms) = self.goal.pending_thms.remove(origin) else { return Ok(()) };
    let g = self.g;
    for mut thm in thms {
      if let Origin::Decl(n) = thm.origin {
        if g.is_erased(n) {
          continue
        }
      }
      thm.patterns.retain(|&p| !matcher_args.contains(&ground_of(g, p).unwrap_or(p)));
      if g.cfg.trace_activation {
        vprintln!("reinserting {:?}", thm.origin);
      }
      self.activate_theorem(thm, gen)?
    }
    Ok(())
  }

  /// First internalization of a saturated matcher application: activate the
  /// match-equation lemmas registered for the matcher, exactly once.
  pub fn add_match_eqns(&mut self, e: ExprId, n: NameId, gen: u32) -> Result<()> {
    let Some((arity, eqns)) = self.g.matcher_info(n) else { return Ok(()) };
    if self.g.exprs.app_arity(e) < arity || self.goal.processed_matchers.contains(&n) {
      return Ok(())
    }
    self.goal.processed_matchers.insert(n);
    let args = self.g.exprs.get_app_args(e);
    for origin in eqns {
      self.activate_theorem_patterns(origin, &args, gen)?
    }
    Ok(())
  }
}
