//! The host environment: constant metadata and the typing/unfolding queries
//! the internalizer consumes.
//!
//! This plays the role of the elaborator/kernel collaborator: a deliberately
//! simplified symbolic typing discipline (constants carry declared types,
//! applications consume `Pi`s, `whnf` unfolds reducible constants and beta
//! redexes). The internalization contract only needs these queries to be
//! stable and cheap, not complete.

use crate::ematch::Origin;
use crate::error::{Error, Result};
use crate::expr::{Expr, ExprId, Exprs, FVarId, Literal, MVarId, NameId, Names};
use crate::types::Idx;
use crate::Config;
use enum_map::{enum_map, Enum, EnumMap};
use std::collections::{HashMap, HashSet};

/// Well-known constant names, interned once at environment creation.
pub struct Known {
  pub eq: NameId,
  pub heq: NameId,
  pub iff: NameId,
  pub and: NameId,
  pub or: NameId,
  pub not: NameId,
  pub true_: NameId,
  pub false_: NameId,
  pub ite: NameId,
  pub dite: NameId,
  pub nat: NameId,
  pub string: NameId,
  pub of_nat: NameId,
  pub nested_proof: NameId,
  pub match_cond: NameId,
  pub ground_pattern: NameId,
  pub dontcare: NameId,
  pub cast: NameId,
  pub eq_rec: NameId,
  pub eq_ndrec: NameId,
  pub eq_rec_on: NameId,
  pub cast_heq: NameId,
  pub eq_rec_heq: NameId,
  pub eq_ndrec_heq: NameId,
  pub eq_rec_on_heq: NameId,
  pub hadd: NameId,
  pub hmul: NameId,
}

impl Known {
  fn new(names: &mut Names) -> Self {
    Known {
      eq: names.intern("Eq"),
      heq: names.intern("HEq"),
      iff: names.intern("Iff"),
      and: names.intern("And"),
      or: names.intern("Or"),
      not: names.intern("Not"),
      true_: names.intern("True"),
      false_: names.intern("False"),
      ite: names.intern("ite"),
      dite: names.intern("dite"),
      nat: names.intern("Nat"),
      string: names.intern("String"),
      of_nat: names.intern("OfNat.ofNat"),
      nested_proof: names.intern("Grind.nestedProof"),
      match_cond: names.intern("Grind.MatchCond"),
      ground_pattern: names.intern("Grind.groundPattern"),
      dontcare: names.intern("Grind.dontCare"),
      cast: names.intern("cast"),
      eq_rec: names.intern("Eq.rec"),
      eq_ndrec: names.intern("Eq.ndrec"),
      eq_rec_on: names.intern("Eq.recOn"),
      cast_heq: names.intern("cast_heq"),
      eq_rec_heq: names.intern("eqRec_heq"),
      eq_ndrec_heq: names.intern("eqNDRec_heq"),
      eq_rec_on_heq: names.intern("eqRecOn_heq"),
      hadd: names.intern("HAdd.hAdd"),
      hmul: names.intern("HMul.hMul"),
    }
  }
}

#[derive(Clone, Debug, Default)]
pub enum ConstKind {
  #[default]
  Plain,
  /// Unfolds to the given definition under `whnf`. The unfolding must itself
  /// be in normal form for ground-pattern preprocessing to be idempotent.
  Reducible(ExprId),
  /// Compiler-generated pattern matcher with `arity` fixed arguments and a
  /// set of match-equation lemmas activated on first internalization.
  Matcher { arity: usize, eqns: Vec<Origin> },
}

#[derive(Clone, Debug, Default)]
pub struct ConstInfo {
  pub ty: Option<ExprId>,
  pub kind: ConstKind,
  pub is_ctor: bool,
}

/// The four dependent-cast elimination families recognized by
/// `push_cast_heqs`.
#[derive(Copy, Clone, Debug, Enum)]
pub enum CastKind {
  Cast,
  EqNDRec,
  EqRec,
  EqRecOn,
}

/// Shape of one cast family: full application of `head` to `arity` arguments
/// whose `val`-th argument is the value being transported, eliminated by
/// applying `lemma` to the same spine.
#[derive(Copy, Clone, Debug)]
pub struct CastSpec {
  pub head: NameId,
  pub arity: usize,
  pub val: usize,
  pub lemma: NameId,
}

pub struct Global {
  pub cfg: Config,
  pub names: Names,
  pub exprs: Exprs,
  pub known: Known,
  consts: HashMap<NameId, ConstInfo>,
  fvar_types: HashMap<FVarId, ExprId>,
  next_fvar: FVarId,
  next_mvar: MVarId,
  mvar_assignment: HashMap<MVarId, ExprId>,
  /// Inductive types registered for case splitting.
  cases_types: HashSet<NameId>,
  /// Lemmas removed by the user; activation skips them silently.
  erased: HashSet<NameId>,
  cast_table: EnumMap<CastKind, CastSpec>,
}

impl Global {
  pub fn new(cfg: Config) -> Self {
    let mut names = Names::default();
    let known = Known::new(&mut names);
    let cast_table = enum_map! {
      CastKind::Cast =>
        CastSpec { head: known.cast, arity: 4, val: 3, lemma: known.cast_heq },
      CastKind::EqNDRec =>
        CastSpec { head: known.eq_ndrec, arity: 6, val: 3, lemma: known.eq_ndrec_heq },
      CastKind::EqRec =>
        CastSpec { head: known.eq_rec, arity: 6, val: 3, lemma: known.eq_rec_heq },
      CastKind::EqRecOn =>
        CastSpec { head: known.eq_rec_on, arity: 6, val: 5, lemma: known.eq_rec_on_heq },
    };
    let mut g = Global {
      cfg,
      names,
      exprs: Exprs::default(),
      known,
      consts: HashMap::new(),
      fvar_types: HashMap::new(),
      next_fvar: FVarId::default(),
      next_mvar: MVarId::default(),
      mvar_assignment: HashMap::new(),
      cases_types: HashSet::new(),
      erased: HashSet::new(),
      cast_table,
    };
    for n in [
      g.known.eq,
      g.known.heq,
      g.known.iff,
      g.known.and,
      g.known.or,
      g.known.not,
      g.known.true_,
      g.known.false_,
      g.known.ite,
      g.known.dite,
      g.known.nat,
      g.known.string,
      g.known.of_nat,
      g.known.nested_proof,
      g.known.match_cond,
      g.known.ground_pattern,
      g.known.dontcare,
      g.known.cast,
      g.known.eq_rec,
      g.known.eq_ndrec,
      g.known.eq_rec_on,
      g.known.cast_heq,
      g.known.eq_rec_heq,
      g.known.eq_ndrec_heq,
      g.known.eq_rec_on_heq,
      g.known.hadd,
      g.known.hmul,
    ] {
      g.consts.entry(n).or_default();
    }
    g
  }

  pub fn cast_table(&self) -> &EnumMap<CastKind, CastSpec> { &self.cast_table }

  // Environment construction, used by the tactic driver before solving.

  pub fn add_const(&mut self, name: &str, ty: Option<ExprId>) -> NameId {
    let n = self.names.intern(name);
    let info = self.consts.entry(n).or_default();
    if ty.is_some() {
      info.ty = ty
    }
    n
  }

  pub fn set_ctor(&mut self, n: NameId) { self.consts.entry(n).or_default().is_ctor = true }

  pub fn set_reducible(&mut self, n: NameId, unfolding: ExprId) {
    self.consts.entry(n).or_default().kind = ConstKind::Reducible(unfolding)
  }

  pub fn set_matcher(&mut self, n: NameId, arity: usize, eqns: Vec<Origin>) {
    self.consts.entry(n).or_default().kind = ConstKind::Matcher { arity, eqns }
  }

  pub fn add_cases_type(&mut self, n: NameId) { self.cases_types.insert(n); }

  pub fn erase_theorem(&mut self, n: NameId) { self.erased.insert(n); }

  pub fn mk_fvar(&mut self, ty: ExprId) -> ExprId {
    let v = self.next_fvar.fresh();
    self.fvar_types.insert(v, ty);
    self.exprs.mk_fvar(v)
  }

  pub fn mk_mvar(&mut self) -> ExprId {
    let m = self.next_mvar.fresh();
    self.exprs.mk_mvar(m)
  }

  pub fn assign_mvar(&mut self, m: MVarId, val: ExprId) { self.mvar_assignment.insert(m, val); }

  pub fn is_mvar_assigned(&self, m: MVarId) -> bool { self.mvar_assignment.contains_key(&m) }

  // Host queries.

  pub fn get_const_info(&self, n: NameId) -> Result<&ConstInfo> {
    self.consts.get(&n).ok_or(Error::UnknownConstant(n))
  }

  pub fn is_erased(&self, n: NameId) -> bool { self.erased.contains(&n) }

  pub fn is_cases_type(&self, n: NameId) -> bool { self.cases_types.contains(&n) }

  pub fn is_ctor_app(&self, e: ExprId) -> bool {
    match self.exprs.app_head_const(e) {
      Some(n) => self.consts.get(&n).is_some_and(|c| c.is_ctor),
      None => false,
    }
  }

  /// Is this a natural-number literal or an `OfNat.ofNat` packaging of one?
  pub fn is_lit_value(&self, e: ExprId) -> bool {
    match self.exprs.get(e) {
      Expr::Lit(_) => true,
      Expr::App(..) => {
        self.exprs.app_head_const(e) == Some(self.known.of_nat)
          && (self.exprs.get_app_args(e).iter())
            .any(|&a| matches!(self.exprs.get(a), Expr::Lit(Literal::Nat(_))))
      }
      _ => false,
    }
  }

  /// Matcher metadata for a head constant, if it is one.
  pub fn matcher_info(&self, n: NameId) -> Option<(usize, &[Origin])> {
    match self.consts.get(&n).map(|c| &c.kind) {
      Some(ConstKind::Matcher { arity, eqns }) => Some((*arity, eqns)),
      _ => None,
    }
  }

  pub fn is_matcher_app(&self, e: ExprId) -> bool {
    let Some(n) = self.exprs.app_head_const(e) else { return false };
    match self.consts.get(&n).map(|c| &c.kind) {
      Some(&ConstKind::Matcher { arity, .. }) => self.exprs.app_arity(e) >= arity,
      _ => false,
    }
  }

  /// One-step matcher reduction. Matcher reduction is definitional unfolding
  /// and belongs to the host kernel; this environment treats every matcher
  /// application as stuck, which is conservative for split detection.
  pub fn reduce_matcher(&self, _e: ExprId) -> Option<ExprId> { None }

  /// Weak head normal form: strip metadata, contract head beta redexes, and
  /// unfold reducible head constants.
  pub fn whnf(&self, e: ExprId) -> Result<ExprId> {
    let mut e = e;
    let mut fuel = self.cfg.max_rec_depth;
    loop {
      if fuel == 0 {
        return Err(Error::MaxRecDepth)
      }
      fuel -= 1;
      if let Expr::MData(x) = self.exprs.get(e) {
        e = x;
        continue
      }
      let e2 = self.exprs.beta_reduce(e);
      if e2 != e {
        e = e2;
        continue
      }
      let head = self.exprs.get_app_fn(e);
      if let Expr::Const(n) = self.exprs.get(head) {
        if let Some(ConstInfo { kind: ConstKind::Reducible(unf), .. }) = self.consts.get(&n) {
          let args = self.exprs.get_app_args(e);
          e = self.exprs.mk_app_spine(*unf, &args);
          continue
        }
      }
      return Ok(e)
    }
  }

  fn infer(&self, e: ExprId, ctx: &mut Vec<ExprId>) -> Result<ExprId> {
    match self.exprs.get(e) {
      Expr::BVar(i) => {
        ctx.get(ctx.len().wrapping_sub(1 + i as usize)).copied().ok_or(Error::IllTyped)
      }
      Expr::FVar(v) => self.fvar_types.get(&v).copied().ok_or(Error::IllTyped),
      Expr::MVar(_) => Err(Error::IllTyped),
      Expr::Sort(l) => Ok(self.exprs.mk_sort(l + 1)),
      Expr::Const(n) => self.get_const_info(n)?.ty.ok_or(Error::IllTyped),
      Expr::App(f, a) => {
        let fty = self.whnf(self.infer(f, ctx)?)?;
        match self.exprs.get(fty) {
          Expr::Pi { body, .. } =>
            if !self.exprs.has_loose_bvars(a) {
              Ok(self.exprs.instantiate(body, a))
            } else if !self.exprs.has_loose_bvars(body) {
              // non-dependent arrow applied under a binder
              Ok(body)
            } else {
              Err(Error::IllTyped)
            },
          _ => Err(Error::IllTyped),
        }
      }
      Expr::Lam { ty, body } => {
        ctx.push(ty);
        let bt = self.infer(body, ctx);
        ctx.pop();
        Ok(self.exprs.mk(Expr::Pi { ty, body: bt? }))
      }
      Expr::Pi { ty, body } => {
        ctx.push(ty);
        let bt = self.infer(body, ctx);
        ctx.pop();
        match self.exprs.get(self.whnf(bt?)?) {
          Expr::Sort(l) => Ok(self.exprs.mk_sort(l)),
          _ => Err(Error::IllTyped),
        }
      }
      Expr::Lit(Literal::Nat(_)) => Ok(self.exprs.mk_const(self.known.nat)),
      Expr::Lit(Literal::Str(_)) => Ok(self.exprs.mk_const(self.known.string)),
      Expr::MData(x) => self.infer(x, ctx),
      Expr::Proj(..) => Err(Error::IllTyped),
    }
  }

  pub fn infer_type(&self, e: ExprId) -> Result<ExprId> { self.infer(e, &mut vec![]) }

  fn is_prop_in(&self, e: ExprId, ctx: &mut Vec<ExprId>) -> Result<bool> {
    match self.infer(e, ctx).and_then(|ty| self.whnf(ty)) {
      Ok(ty) => Ok(self.exprs.get(ty) == Expr::Sort(0)),
      // The simplified typing is partial; an untypeable term is not a Prop.
      Err(Error::IllTyped) => Ok(false),
      Err(e) => Err(e),
    }
  }

  pub fn is_prop(&self, e: ExprId) -> Result<bool> { self.is_prop_in(e, &mut vec![]) }

  /// Prop check for a binder body, under the binder's domain.
  pub fn is_prop_under(&self, body: ExprId, dom: ExprId) -> Result<bool> {
    self.is_prop_in(body, &mut vec![dom])
  }

  /// Do two terms have the same type? Used only to grade cross-symbol
  /// congruences; an untypeable side counts as a mismatch.
  pub fn has_same_type(&self, a: ExprId, b: ExprId) -> Result<bool> {
    let ta = match self.infer_type(a).and_then(|t| self.whnf(t)) {
      Ok(t) => t,
      Err(Error::IllTyped) => return Ok(false),
      Err(e) => return Err(e),
    };
    let tb = match self.infer_type(b).and_then(|t| self.whnf(t)) {
      Ok(t) => t,
      Err(Error::IllTyped) => return Ok(false),
      Err(e) => return Err(e),
    };
    Ok(ta == tb)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::Expr;

  #[test]
  fn whnf_unfolds_reducible() {
    let mut g = Global::new(Config::default());
    let f = g.add_const("f", None);
    let a = g.exprs.mk_nat(1);
    let id_body = {
      let ty = g.exprs.mk_sort(0);
      let b0 = g.exprs.mk_bvar(0);
      g.exprs.mk(Expr::Lam { ty, body: b0 })
    };
    g.set_reducible(f, id_body);
    let fa = g.exprs.mk_app(g.exprs.mk_const(f), a);
    assert_eq!(g.whnf(fa).unwrap(), a);
  }

  #[test]
  fn infer_app_consumes_pi() {
    let mut g = Global::new(Config::default());
    let nat = g.exprs.mk_const(g.known.nat);
    let fty = g.exprs.mk(Expr::Pi { ty: nat, body: nat });
    let f = g.add_const("f", Some(fty));
    let fa = g.exprs.mk_app(g.exprs.mk_const(f), g.exprs.mk_nat(2));
    assert_eq!(g.infer_type(fa).unwrap(), nat);
  }

  #[test]
  fn prop_fvar_is_prop() {
    let mut g = Global::new(Config::default());
    let prop = g.exprs.mk_sort(0);
    let p = g.mk_fvar(prop);
    assert!(g.is_prop(p).unwrap());
    let nat = g.exprs.mk_const(g.known.nat);
    let x = g.mk_fvar(nat);
    assert!(!g.is_prop(x).unwrap());
  }

  #[test]
  fn unknown_constant_is_an_error() {
    let g = Global::new(Config::default());
    // an id no constant was ever registered under
    let e = g.exprs.mk_const(crate::expr::NameId(999));
    assert!(matches!(g.infer_type(e), Err(Error::UnknownConstant(_))));
  }
}
