//! Bottom-up term internalization.
//!
//! [`Internalizer::internalize`] walks a term, creates e-nodes for the
//! subterms the solver tracks, wires parent links, feeds the congruence
//! table and app map, and fires the side hooks: split-candidate detection,
//! cast elimination, arithmetic atom collection, match-equation activation,
//! and beta propagation for applied lambdas.

use crate::congr::{add_congr_table, update_app_map};
use crate::error::{Error, Result};
use crate::expr::{Expr, ExprId, Literal};
use crate::global::Global;
use crate::goal::{Goal, Proof};
use crate::{stat, vprintln};
use num_traits::Zero;

const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW: usize = 4 * 1024 * 1024;

pub struct Internalizer<'a> {
  pub g: &'a Global,
  pub goal: &'a mut Goal,
  depth: u32,
}

impl<'a> Internalizer<'a> {
  pub fn new(g: &'a Global, goal: &'a mut Goal) -> Self { Internalizer { g, goal, depth: 0 } }

  /// Internalize `e` at generation `gen`. Idempotent: a term that already
  /// has an e-node only gets its generation stamp refreshed.
  pub fn internalize(&mut self, e: ExprId, gen: u32, parent: Option<ExprId>) -> Result<()> {
    self.depth += 1;
    let r = if self.depth > self.g.cfg.max_rec_depth {
      Err(Error::MaxRecDepth)
    } else {
      stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || self.go(e, gen, parent))
    };
    self.depth -= 1;
    r
  }

  fn go(&mut self, e: ExprId, gen: u32, _parent: Option<ExprId>) -> Result<()> {
    if self.goal.already_internalized(e) {
      self.goal.mk_enode(e, gen, false, false);
      return Ok(())
    }
    match self.g.exprs.get(e) {
      // the preprocessor abstracts bound variables before handing terms over
      Expr::BVar(_) => unreachable!("loose bound variable during internalization"),
      Expr::MData(_) =>
        panic!("unexpected metadata during internalization; preprocessing erases metadata"),
      Expr::Proj(..) =>
        panic!("unexpected kernel projection during internalization; preprocessing folds projections"),
      Expr::Sort(_) => Ok(()),
      Expr::FVar(_) => {
        self.goal.mk_enode(e, gen, false, false);
        self.check_and_add_split_candidate(e)
      }
      Expr::MVar(m) => {
        if self.g.cfg.report_issues && !self.g.is_mvar_assigned(m) {
          self.goal.report_issue(format!(
            "unexpected metavariable `{}` during internalization; `grind` is not supposed \
             to be used in goals containing metavariables",
            self.g.pp(e)
          ));
        }
        // still give it an e-node so hypotheses mentioning it stay usable
        self.goal.mk_enode(e, gen, false, false);
        Ok(())
      }
      Expr::Lit(_) => {
        self.goal.mk_enode(e, gen, true, false);
        self.arith_internalize(e)
      }
      Expr::Lam { .. } => {
        self.goal.mk_enode(e, gen, false, false);
        Ok(())
      }
      Expr::Pi { ty, body } => self.internalize_forall(e, ty, body, gen),
      Expr::Const(_) | Expr::App(..) => self.internalize_app(e, gen),
    }
  }

  /// Propositional implications (and `∀` over props) get e-nodes so that
  /// truth propagation can see them; other binders are opaque leaves.
  fn internalize_forall(&mut self, e: ExprId, ty: ExprId, body: ExprId, gen: u32) -> Result<()> {
    if self.g.is_prop(ty)? && self.g.is_prop_under(body, ty)? {
      self.internalize(ty, gen, Some(e))?;
      self.goal.register_parent(e, ty);
      if !self.g.exprs.has_loose_bvars(body) {
        self.internalize(body, gen, Some(e))?;
        self.goal.register_parent(e, body);
      }
    }
    self.goal.mk_enode(e, gen, false, false);
    Ok(())
  }

  fn internalize_app(&mut self, e: ExprId, gen: u32) -> Result<()> {
    if self.g.is_lit_value(e) {
      // numeral packagings are interpreted atoms, opaque to congruence
      self.goal.mk_enode(e, gen, true, false);
      return self.arith_internalize(e)
    }
    let head = self.g.exprs.get_app_fn(e);
    let head_name = self.g.exprs.const_name(head);
    if head_name == Some(self.g.known.match_cond) {
      return self.internalize_match_cond(e, gen)
    }
    self.check_and_add_split_candidate(e)?;
    self.push_cast_heqs(e)?;
    if let Some(n) = head_name {
      self.add_match_eqns(e, n, gen)?;
    }
    let args = self.g.exprs.get_app_args(e);
    if head_name == Some(self.g.known.nested_proof) && !args.is_empty() {
      // the wrapper itself is never tracked; only the wrapped term is
      let prf = *args.last().unwrap();
      self.internalize(prf, gen, Some(e))?;
      self.goal.register_parent(e, prf);
      return Ok(())
    }
    if head_name == Some(self.g.known.ite) && args.len() == 5 {
      // branches stay uninternalized until a split resolves the condition
      self.internalize(args[1], gen, Some(e))?;
      self.goal.register_parent(e, args[1]);
    } else {
      if head != e {
        self.internalize(head, gen, Some(e))?;
        self.goal.register_parent(e, head);
      }
      for &arg in &args {
        self.internalize(arg, gen, Some(e))?;
        self.goal.register_parent(e, arg);
      }
    }
    self.goal.mk_enode(e, gen, false, self.g.is_ctor_app(e));
    add_congr_table(self.g, self.goal, e)?;
    update_app_map(self.g, self.goal, e);
    self.arith_internalize(e)?;
    self.propagate_up(e);
    self.propagate_beta_for_new_app(e, gen)
  }

  /// `Eq` at sort `Prop`: an equality of propositions, split-relevant no
  /// matter what the head symbol deny-list says.
  fn is_morally_iff(&self, e: ExprId) -> Result<bool> {
    let w = self.g.whnf(e)?;
    if !self.g.exprs.is_app_of(w, self.g.known.eq, 3) {
      return Ok(false)
    }
    Ok(self.g.exprs.get_app_args(w)[0] == self.g.exprs.mk_sort(0))
  }

  fn is_cases_candidate(&self, e: ExprId) -> Result<bool> {
    let ty = match self.g.infer_type(e) {
      Ok(ty) => ty,
      // the typing discipline is partial; an untypeable term is not a candidate
      Err(Error::IllTyped) => return Ok(false),
      Err(err) => return Err(err),
    };
    let ty = self.g.whnf(ty)?;
    Ok(match self.g.exprs.app_head_const(ty) {
      Some(n) => self.g.is_cases_type(n),
      None => false,
    })
  }

  fn check_and_add_split_candidate(&mut self, e: ExprId) -> Result<()> {
    if self.is_morally_iff(e)? {
      self.add_split_candidate(e);
      return Ok(())
    }
    if !self.g.cfg.splits {
      return Ok(())
    }
    // equality/True/False atoms never go through the matcher-based check;
    // they are handled by dedicated machinery downstream
    let forbidden = match self.g.exprs.app_head_const(e) {
      Some(n) => {
        let k = &self.g.known;
        [k.eq, k.heq, k.true_, k.false_].contains(&n)
      }
      None => false,
    };
    if !forbidden
      && self.g.cfg.split_match
      && (self.g.is_matcher_app(e) || self.g.reduce_matcher(e).is_some())
    {
      self.add_split_candidate(e);
      return Ok(())
    }
    if self.is_cases_candidate(e)? {
      self.add_split_candidate(e);
      return Ok(())
    }
    if self.g.cfg.split_ite {
      let k = &self.g.known;
      if self.g.exprs.is_app_of(e, k.ite, 5) || self.g.exprs.is_app_of(e, k.dite, 5) {
        self.add_split_candidate(e);
      }
    }
    Ok(())
  }

  fn add_split_candidate(&mut self, e: ExprId) {
    if self.g.cfg.trace_split {
      vprintln!("split candidate: {}", self.g.pp(e));
    }
    self.goal.split_candidates.push_back(e);
    stat("split_candidate")
  }

  /// Recognize dependent casts and queue the heterogeneous equation linking
  /// the cast application to the value being transported.
  fn push_cast_heqs(&mut self, e: ExprId) -> Result<()> {
    let Some(head) = self.g.exprs.app_head_const(e) else { return Ok(()) };
    let Some(shape) = self.g.cast_table().values().find(|s| s.head == head) else {
      return Ok(())
    };
    let args = self.g.exprs.get_app_args(e);
    if args.len() != shape.arity {
      return Ok(())
    }
    // the elimination lemma must exist in the environment
    self.g.get_const_info(shape.lemma)?;
    let lemma = self.g.exprs.mk_const(shape.lemma);
    let proof = self.g.exprs.mk_app_spine(lemma, &args);
    self.goal.push_heq(e, args[shape.val], Proof::Opaque(proof));
    stat("cast_heq");
    Ok(())
  }

  fn arith_internalize(&mut self, e: ExprId) -> Result<()> {
    let k = &self.g.known;
    let head = self.g.exprs.app_head_const(e);
    let saturated = self.g.exprs.app_arity(e) == 6;
    let is_atom = matches!(self.g.exprs.get(e), Expr::Lit(Literal::Nat(_)))
      || (saturated && (head == Some(k.hadd) || head == Some(k.hmul)));
    if !is_atom {
      return Ok(())
    }
    self.goal.arith_atoms.push_back(e);
    stat("arith_atom");
    if head == Some(k.hadd) {
      let args = self.g.exprs.get_app_args(e);
      if args.len() == 6 {
        if let Expr::Lit(Literal::Nat(n)) = self.g.exprs.get(args[5]) {
          // x + 0 collapses immediately
          if n.is_zero() {
            self.goal.push_eq(e, args[4], Proof::Refl);
          }
        }
      }
    }
    Ok(())
  }

  /// Dispatch point for truth-value propagation over logical connectives.
  /// The propagation rules themselves live in the proof engine driving this
  /// core; here we only mark the node as propagation-relevant.
  fn propagate_up(&mut self, e: ExprId) {
    let Some(n) = self.g.exprs.app_head_const(e) else { return };
    let k = &self.g.known;
    if [k.eq, k.heq, k.iff, k.and, k.or, k.not, k.ite, k.dite].contains(&n) {
      vprintln!("propagate up: {}", self.g.pp(e));
      stat("propagate_up")
    }
  }

  /// A freshly internalized application with a lambda head is a beta redex;
  /// internalize its reduct and link the two.
  fn propagate_beta_for_new_app(&mut self, e: ExprId, gen: u32) -> Result<()> {
    let f = self.g.exprs.get_app_fn(e);
    if !matches!(self.g.exprs.get(f), Expr::Lam { .. }) {
      return Ok(())
    }
    let r = self.g.exprs.beta_reduce(e);
    if r != e {
      self.internalize(r, gen, None)?;
      self.goal.push_eq(e, r, Proof::Refl);
    }
    Ok(())
  }
}
