//! The solver's transactional state: e-nodes, the equation queue, split
//! candidates, and the theorem sets.
//!
//! Every container is persistent (`im`), so `Goal::clone` is the snapshot
//! operation: the backtracking search keeps old `Goal` values and discards
//! stale ones instead of undoing mutations.

use crate::congr::CongrKey;
use crate::ematch::{EMatchTheorem, Origin};
use crate::expr::{ExprId, HeadIndex, NameId};
use crate::{stat, vprintln};

/// Justification payload attached to a queued equation. Proof terms proper
/// are opaque to this core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Proof {
  /// Placeholder congruence proof, reconstructed downstream.
  Congr,
  Refl,
  Opaque(ExprId),
}

#[derive(Clone, Debug)]
pub struct NewEq {
  pub lhs: ExprId,
  pub rhs: ExprId,
  pub proof: Proof,
  pub is_heq: bool,
}

/// Per-term control block of the union-find / congruence structure.
///
/// `next` forms a ring through the members of the equivalence class; `root`
/// is eagerly rewritten for the whole class on every union, so root lookup
/// is O(1) and class enumeration is O(class size).
#[derive(Clone, Debug)]
pub struct ENode {
  pub term: ExprId,
  pub next: ExprId,
  pub root: ExprId,
  /// `Some` only at the class root.
  pub root_class_size: Option<u32>,
  /// Literals and theory-interpreted atoms; excluded from congruence.
  pub interpreted: bool,
  /// Constructor application, preserved for injectivity reasoning.
  pub ctor: bool,
  /// Whether justifications in this class use heterogeneous equality.
  pub heq_proofs: bool,
  /// Orientation of the proof-forest edge to `target`.
  pub flipped: bool,
  /// Monotonic creation index, for deterministic iteration.
  pub idx: u32,
  /// Solver round this node was (last) internalized in; never decreases.
  pub generation: u32,
  /// Applications with this node as an immediate subterm.
  pub parents: Vec<ExprId>,
  /// Proof-forest edge toward the class representative.
  pub target: Option<ExprId>,
  pub proof: Option<Proof>,
}

#[derive(Clone, Default)]
pub struct Goal {
  pub enodes: im::HashMap<ExprId, ENode>,
  pub congr_table: im::HashMap<CongrKey, ExprId>,
  pub app_map: im::HashMap<HeadIndex, Vec<ExprId>>,
  pub split_candidates: im::Vector<ExprId>,
  pub new_eqs: im::Vector<NewEq>,
  pub active_thms: im::Vector<EMatchTheorem>,
  pub pending_thms: im::HashMap<Origin, Vec<EMatchTheorem>>,
  pub processed_matchers: im::HashSet<NameId>,
  /// Atoms handed to the (external) arithmetic theory.
  pub arith_atoms: im::Vector<ExprId>,
  pub issues: im::Vector<String>,
  next_idx: u32,
}

impl Goal {
  pub fn new() -> Self { Self::default() }

  pub fn get_enode(&self, e: ExprId) -> Option<&ENode> { self.enodes.get(&e) }

  pub fn already_internalized(&self, e: ExprId) -> bool { self.enodes.contains_key(&e) }

  pub fn set_enode(&mut self, n: ENode) { self.enodes.insert(n.term, n); }

  /// Create the e-node for `e` if it does not exist yet. Re-internalization
  /// only bumps the generation stamp (monotonically).
  pub fn mk_enode(&mut self, e: ExprId, generation: u32, interpreted: bool, ctor: bool) -> bool {
    if let Some(n) = self.enodes.get_mut(&e) {
      n.generation = n.generation.max(generation);
      return false
    }
    let idx = self.next_idx;
    self.next_idx += 1;
    self.enodes.insert(
      e,
      ENode {
        term: e,
        next: e,
        root: e,
        root_class_size: Some(1),
        interpreted,
        ctor,
        heq_proofs: false,
        flipped: false,
        idx,
        generation,
        parents: vec![],
        target: None,
        proof: None,
      },
    );
    stat("enode");
    true
  }

  /// Record `parent` in `child`'s parent list, without duplicates.
  pub fn register_parent(&mut self, parent: ExprId, child: ExprId) {
    let Some(n) = self.enodes.get_mut(&child) else { return };
    if !n.parents.contains(&parent) {
      n.parents.push(parent)
    }
  }

  /// The canonical representative of `e`'s class, or `e` itself when `e`
  /// was never internalized (used for congruence keys over terms whose
  /// subterms are deliberately left uninternalized, e.g. `ite` branches).
  pub fn root_of(&self, e: ExprId) -> ExprId {
    match self.enodes.get(&e) {
      Some(n) => n.root,
      None => e,
    }
  }

  pub fn is_same_root(&self, a: ExprId, b: ExprId) -> bool { self.root_of(a) == self.root_of(b) }

  fn class_size(&self, root: ExprId) -> u32 {
    self.enodes.get(&root).and_then(|n| n.root_class_size).unwrap_or(1)
  }

  /// All members of the class of `root`, by ring traversal.
  pub fn class_members(&self, root: ExprId) -> Vec<ExprId> {
    let mut out = vec![root];
    let mut cur = self.enodes[&root].next;
    while cur != root {
      out.push(cur);
      cur = self.enodes[&cur].next
    }
    out
  }

  /// Merge the classes of `a` and `b`. The larger class survives as the
  /// representative. Returns the parents of the absorbed class so the
  /// caller can re-run congruence detection on them, or `None` if the two
  /// were already in the same class.
  pub fn union_roots(&mut self, a: ExprId, b: ExprId, is_heq: bool) -> Option<Vec<ExprId>> {
    let ra = self.root_of(a);
    let rb = self.root_of(b);
    if ra == rb {
      return None
    }
    let (keep, away) =
      if self.class_size(ra) >= self.class_size(rb) { (ra, rb) } else { (rb, ra) };
    let members = self.class_members(away);
    let mut parents = vec![];
    for &m in &members {
      let n = self.enodes.get_mut(&m).expect("class member has an enode");
      n.root = keep;
      parents.extend(n.parents.iter().copied());
    }
    let total = self.class_size(keep) + members.len() as u32;
    let keep_next = self.enodes[&keep].next;
    let away_next = self.enodes[&away].next;
    let away_heq = self.enodes[&away].heq_proofs;
    {
      let n = self.enodes.get_mut(&keep).expect("root has an enode");
      n.next = away_next;
      n.root_class_size = Some(total);
      n.heq_proofs |= away_heq || is_heq;
    }
    {
      let n = self.enodes.get_mut(&away).expect("root has an enode");
      n.next = keep_next;
      n.root_class_size = None;
      n.target = Some(keep);
    }
    stat("union");
    Some(parents)
  }

  /// Queue an equation for the propagation loop; the union happens when the
  /// queue is drained, not here.
  pub fn push_eq_core(&mut self, lhs: ExprId, rhs: ExprId, proof: Proof, is_heq: bool) {
    vprintln!("push eq: {lhs:?} {} {rhs:?}", if is_heq { "≍" } else { "=" });
    self.new_eqs.push_back(NewEq { lhs, rhs, proof, is_heq });
    stat("push_eq")
  }

  pub fn push_eq(&mut self, lhs: ExprId, rhs: ExprId, proof: Proof) {
    self.push_eq_core(lhs, rhs, proof, false)
  }

  pub fn push_heq(&mut self, lhs: ExprId, rhs: ExprId, proof: Proof) {
    self.push_eq_core(lhs, rhs, proof, true)
  }

  /// Reflexivity-style propagation for marker terms that only need to exist
  /// in the structure.
  pub fn push_refl_eq(&mut self, e: ExprId) { self.push_eq_core(e, e, Proof::Refl, false) }

  pub fn pop_eq(&mut self) -> Option<NewEq> { self.new_eqs.pop_front() }

  /// Soft diagnostic sink (tier 3): log and continue.
  pub fn report_issue(&mut self, msg: String) {
    vprintln!("issue: {msg}");
    self.issues.push_back(msg);
    stat("issue")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::Exprs;

  fn exprs3() -> (Exprs, ExprId, ExprId, ExprId) {
    let es = Exprs::default();
    let (a, b, c) = (es.mk_nat(0), es.mk_nat(1), es.mk_nat(2));
    (es, a, b, c)
  }

  #[test]
  fn mk_enode_is_idempotent_and_generation_monotonic() {
    let (_es, a, _, _) = exprs3();
    let mut goal = Goal::new();
    assert!(goal.mk_enode(a, 3, false, false));
    assert!(!goal.mk_enode(a, 1, false, false));
    assert_eq!(goal.get_enode(a).unwrap().generation, 3);
    assert!(!goal.mk_enode(a, 5, false, false));
    assert_eq!(goal.get_enode(a).unwrap().generation, 5);
  }

  #[test]
  fn register_parent_does_not_duplicate() {
    let (es, a, _, _) = exprs3();
    let mut goal = Goal::new();
    goal.mk_enode(a, 0, false, false);
    let mut names = crate::expr::Names::default();
    let f = es.mk_const(names.intern("f"));
    let fa = es.mk_app(f, a);
    goal.register_parent(fa, a);
    goal.register_parent(fa, a);
    assert_eq!(goal.get_enode(a).unwrap().parents, vec![fa]);
  }

  #[test]
  fn union_merges_rings_and_sizes() {
    let (_es, a, b, c) = exprs3();
    let mut goal = Goal::new();
    for e in [a, b, c] {
      goal.mk_enode(e, 0, false, false);
    }
    assert!(goal.union_roots(a, b, false).is_some());
    assert!(goal.is_same_root(a, b));
    assert!(!goal.is_same_root(a, c));
    let root = goal.root_of(a);
    assert_eq!(goal.get_enode(root).unwrap().root_class_size, Some(2));
    let mut members = goal.class_members(root);
    members.sort();
    let mut expect = vec![a, b];
    expect.sort();
    assert_eq!(members, expect);
    // the larger class keeps its representative
    assert!(goal.union_roots(c, a, false).is_some());
    assert_eq!(goal.root_of(c), root);
    assert_eq!(goal.get_enode(root).unwrap().root_class_size, Some(3));
    assert_eq!(goal.class_members(root).len(), 3);
    // redundant union is a no-op
    assert!(goal.union_roots(a, c, false).is_none());
  }

  #[test]
  fn heq_flag_survives_union() {
    let (_es, a, b, _) = exprs3();
    let mut goal = Goal::new();
    goal.mk_enode(a, 0, false, false);
    goal.mk_enode(b, 0, false, false);
    goal.union_roots(a, b, true);
    assert!(goal.get_enode(goal.root_of(a)).unwrap().heq_proofs);
  }

  #[test]
  fn clone_is_a_snapshot() {
    let (_es, a, b, _) = exprs3();
    let mut goal = Goal::new();
    goal.mk_enode(a, 0, false, false);
    let snapshot = goal.clone();
    goal.mk_enode(b, 0, false, false);
    goal.union_roots(a, b, false);
    goal.push_refl_eq(a);
    assert!(snapshot.get_enode(b).is_none());
    assert_eq!(snapshot.root_of(a), a);
    assert!(snapshot.new_eqs.is_empty());
    assert!(goal.is_same_root(a, b));
  }
}
