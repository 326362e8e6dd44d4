//! Hash-consed expression arena and structural queries.
//!
//! Expressions are immutable term trees interned in an arena, so `ExprId`
//! equality is structural equality and sharing is implicit. The arena lives
//! behind a `RefCell` because expression construction happens while the
//! internalizer holds the environment by shared reference.

use crate::mk_id;
use crate::types::{Idx, IdxVec};
use num_bigint::BigUint;
use std::cell::RefCell;
use std::collections::HashMap;

mk_id! {
  NameId,
  ExprId,
  FVarId,
  MVarId,
}

/// Interned dotted identifiers (`Eq`, `Nat.rec`, ...).
#[derive(Default, Debug)]
pub struct Names {
  strs: IdxVec<NameId, String>,
  map: HashMap<String, NameId>,
}

impl Names {
  pub fn intern(&mut self, s: &str) -> NameId {
    if let Some(&n) = self.map.get(s) {
      return n
    }
    let n = self.strs.push(s.to_owned());
    self.map.insert(s.to_owned(), n);
    n
  }

  pub fn get(&self, n: NameId) -> &str { &self.strs[n] }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
  Nat(BigUint),
  Str(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
  /// Bound variable (de Bruijn index).
  BVar(u32),
  /// Free/local variable.
  FVar(FVarId),
  /// Metavariable.
  MVar(MVarId),
  /// `Sort 0` is `Prop`.
  Sort(u32),
  Const(NameId),
  App(ExprId, ExprId),
  Lam { ty: ExprId, body: ExprId },
  Pi { ty: ExprId, body: ExprId },
  Lit(Literal),
  /// Metadata wrapper. The internalizer treats this as a contract violation;
  /// it only survives inside types and patterns until preprocessing.
  MData(ExprId),
  /// Kernel projection, same story as `MData`.
  Proj(NameId, u32, ExprId),
}

/// Compact head discriminator for the app map and pattern dedup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HeadIndex {
  Const(NameId),
  FVar(FVarId),
  MVar(MVarId),
  Lit,
  Lam,
  Other,
}

#[derive(Default, Debug)]
struct ExprArena {
  nodes: IdxVec<ExprId, Expr>,
  /// One past the largest loose de Bruijn index in the subtree; 0 = closed.
  loose: IdxVec<ExprId, u32>,
  dedup: HashMap<Expr, ExprId>,
}

/// The expression store. Construction methods take `&self`.
#[derive(Default, Debug)]
pub struct Exprs {
  inner: RefCell<ExprArena>,
}

impl Exprs {
  pub fn mk(&self, e: Expr) -> ExprId {
    let mut a = self.inner.borrow_mut();
    if let Some(&id) = a.dedup.get(&e) {
      return id
    }
    let loose = match e {
      Expr::BVar(i) => i + 1,
      Expr::App(f, x) => a.loose[f].max(a.loose[x]),
      Expr::Lam { ty, body } | Expr::Pi { ty, body } =>
        a.loose[ty].max(a.loose[body].saturating_sub(1)),
      Expr::MData(x) => a.loose[x],
      Expr::Proj(_, _, x) => a.loose[x],
      _ => 0,
    };
    let id = a.nodes.push(e.clone());
    a.loose.push(loose);
    a.dedup.insert(e, id);
    id
  }

  pub fn get(&self, id: ExprId) -> Expr { self.inner.borrow().nodes[id].clone() }

  pub fn has_loose_bvars(&self, id: ExprId) -> bool { self.inner.borrow().loose[id] > 0 }

  pub fn mk_bvar(&self, i: u32) -> ExprId { self.mk(Expr::BVar(i)) }
  pub fn mk_fvar(&self, v: FVarId) -> ExprId { self.mk(Expr::FVar(v)) }
  pub fn mk_mvar(&self, m: MVarId) -> ExprId { self.mk(Expr::MVar(m)) }
  pub fn mk_sort(&self, l: u32) -> ExprId { self.mk(Expr::Sort(l)) }
  pub fn mk_const(&self, n: NameId) -> ExprId { self.mk(Expr::Const(n)) }
  pub fn mk_app(&self, f: ExprId, a: ExprId) -> ExprId { self.mk(Expr::App(f, a)) }
  pub fn mk_nat(&self, n: u64) -> ExprId { self.mk(Expr::Lit(Literal::Nat(BigUint::from(n)))) }

  pub fn mk_app_spine(&self, f: ExprId, args: &[ExprId]) -> ExprId {
    args.iter().fold(f, |f, &a| self.mk_app(f, a))
  }

  /// The head of an application spine (`f` in `f a₁ … aₙ`).
  pub fn get_app_fn(&self, mut e: ExprId) -> ExprId {
    let a = self.inner.borrow();
    while let Expr::App(f, _) = a.nodes[e] {
      e = f
    }
    e
  }

  /// The arguments of an application spine, outermost last.
  pub fn get_app_args(&self, mut e: ExprId) -> Vec<ExprId> {
    let a = self.inner.borrow();
    let mut args = vec![];
    while let Expr::App(f, x) = a.nodes[e] {
      args.push(x);
      e = f
    }
    args.reverse();
    args
  }

  pub fn app_arity(&self, mut e: ExprId) -> usize {
    let a = self.inner.borrow();
    let mut n = 0;
    while let Expr::App(f, _) = a.nodes[e] {
      n += 1;
      e = f
    }
    n
  }

  /// Is `e` an application of the constant `c` to exactly `arity` arguments?
  pub fn is_app_of(&self, e: ExprId, c: NameId, arity: usize) -> bool {
    self.app_arity(e) == arity && self.get(self.get_app_fn(e)) == Expr::Const(c)
  }

  pub fn const_name(&self, e: ExprId) -> Option<NameId> {
    match self.get(e) {
      Expr::Const(n) => Some(n),
      _ => None,
    }
  }

  /// The constant at the head of an application spine, if any.
  pub fn app_head_const(&self, e: ExprId) -> Option<NameId> {
    self.const_name(self.get_app_fn(e))
  }

  pub fn to_head_index(&self, e: ExprId) -> HeadIndex {
    match self.get(self.get_app_fn(e)) {
      Expr::Const(n) => HeadIndex::Const(n),
      Expr::FVar(v) => HeadIndex::FVar(v),
      Expr::MVar(m) => HeadIndex::MVar(m),
      Expr::Lit(_) => HeadIndex::Lit,
      Expr::Lam { .. } => HeadIndex::Lam,
      _ => HeadIndex::Other,
    }
  }

  /// Substitute `arg` for the loose `BVar(depth)` in `e`, decrementing the
  /// indices above it. `arg` must be closed.
  fn inst(&self, e: ExprId, arg: ExprId, depth: u32) -> ExprId {
    if self.inner.borrow().loose[e] <= depth {
      return e
    }
    match self.get(e) {
      Expr::BVar(i) if i == depth => arg,
      Expr::BVar(i) => self.mk_bvar(i - 1),
      Expr::App(f, x) => {
        let (f2, x2) = (self.inst(f, arg, depth), self.inst(x, arg, depth));
        self.mk_app(f2, x2)
      }
      Expr::Lam { ty, body } => {
        let (ty2, body2) = (self.inst(ty, arg, depth), self.inst(body, arg, depth + 1));
        self.mk(Expr::Lam { ty: ty2, body: body2 })
      }
      Expr::Pi { ty, body } => {
        let (ty2, body2) = (self.inst(ty, arg, depth), self.inst(body, arg, depth + 1));
        self.mk(Expr::Pi { ty: ty2, body: body2 })
      }
      Expr::MData(x) => {
        let x2 = self.inst(x, arg, depth);
        self.mk(Expr::MData(x2))
      }
      Expr::Proj(n, i, x) => {
        let x2 = self.inst(x, arg, depth);
        self.mk(Expr::Proj(n, i, x2))
      }
      _ => e,
    }
  }

  pub fn instantiate(&self, body: ExprId, arg: ExprId) -> ExprId {
    debug_assert!(!self.has_loose_bvars(arg));
    self.inst(body, arg, 0)
  }

  /// Head beta reduction: `(fun x => b) a₁ … aₙ` becomes `b[a₁] a₂ … aₙ`,
  /// repeated until the head is no longer a lambda literal. An open argument
  /// stops the reduction (substituting it would need index shifting, and
  /// such redexes only occur under binders, where the term stays symbolic).
  pub fn beta_reduce(&self, e: ExprId) -> ExprId {
    let f = self.get_app_fn(e);
    if !matches!(self.get(f), Expr::Lam { .. }) {
      return e
    }
    let args = self.get_app_args(e);
    let mut f = f;
    let mut i = 0;
    while i < args.len() {
      let Expr::Lam { body, .. } = self.get(f) else { break };
      if self.has_loose_bvars(args[i]) {
        break
      }
      f = self.instantiate(body, args[i]);
      i += 1
    }
    self.mk_app_spine(f, &args[i..])
  }

  /// Strip every metadata wrapper in the tree.
  pub fn erase_mdata(&self, e: ExprId) -> ExprId {
    match self.get(e) {
      Expr::MData(x) => self.erase_mdata(x),
      Expr::App(f, x) => {
        let (f2, x2) = (self.erase_mdata(f), self.erase_mdata(x));
        self.mk_app(f2, x2)
      }
      Expr::Lam { ty, body } => {
        let (ty2, body2) = (self.erase_mdata(ty), self.erase_mdata(body));
        self.mk(Expr::Lam { ty: ty2, body: body2 })
      }
      Expr::Pi { ty, body } => {
        let (ty2, body2) = (self.erase_mdata(ty), self.erase_mdata(body));
        self.mk(Expr::Pi { ty: ty2, body: body2 })
      }
      Expr::Proj(n, i, x) => {
        let x2 = self.erase_mdata(x);
        self.mk(Expr::Proj(n, i, x2))
      }
      _ => e,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hash_consing_gives_identity() {
    let es = Exprs::default();
    let mut names = Names::default();
    let f = es.mk_const(names.intern("f"));
    let a = es.mk_const(names.intern("a"));
    assert_eq!(es.mk_app(f, a), es.mk_app(f, a));
    assert_ne!(es.mk_app(f, a), es.mk_app(a, f));
  }

  #[test]
  fn app_spine_round_trip() {
    let es = Exprs::default();
    let mut names = Names::default();
    let f = es.mk_const(names.intern("f"));
    let (a, b) = (es.mk_nat(1), es.mk_nat(2));
    let e = es.mk_app_spine(f, &[a, b]);
    assert_eq!(es.get_app_fn(e), f);
    assert_eq!(es.get_app_args(e), vec![a, b]);
    assert_eq!(es.app_arity(e), 2);
    assert_eq!(es.to_head_index(e), HeadIndex::Const(names.intern("f")));
  }

  #[test]
  fn loose_bvar_tracking() {
    let es = Exprs::default();
    let b0 = es.mk_bvar(0);
    assert!(es.has_loose_bvars(b0));
    let ty = es.mk_sort(0);
    let lam = es.mk(Expr::Lam { ty, body: b0 });
    assert!(!es.has_loose_bvars(lam));
    let b1 = es.mk_bvar(1);
    let lam2 = es.mk(Expr::Lam { ty, body: b1 });
    assert!(es.has_loose_bvars(lam2));
  }

  #[test]
  fn beta_reduces_under_spine() {
    let es = Exprs::default();
    let mut names = Names::default();
    let g = es.mk_const(names.intern("g"));
    let ty = es.mk_sort(0);
    // (fun x => g x) a  ==>  g a
    let lam = es.mk(Expr::Lam { ty, body: es.mk_app(g, es.mk_bvar(0)) });
    let a = es.mk_nat(7);
    assert_eq!(es.beta_reduce(es.mk_app(lam, a)), es.mk_app(g, a));
    // non-redex is untouched
    assert_eq!(es.beta_reduce(es.mk_app(g, a)), es.mk_app(g, a));
  }

  #[test]
  fn beta_leaves_open_arguments_alone() {
    let es = Exprs::default();
    let ty = es.mk_sort(0);
    let id = es.mk(Expr::Lam { ty, body: es.mk_bvar(0) });
    // (fun y => y) #0 sits under an enclosing binder; no substitution
    let open_redex = es.mk_app(id, es.mk_bvar(0));
    assert_eq!(es.beta_reduce(open_redex), open_redex);
  }

  #[test]
  fn mdata_erasure() {
    let es = Exprs::default();
    let mut names = Names::default();
    let f = es.mk_const(names.intern("f"));
    let a = es.mk_nat(3);
    let wrapped = es.mk_app(f, es.mk(Expr::MData(a)));
    assert_eq!(es.erase_mdata(wrapped), es.mk_app(f, a));
  }
}
