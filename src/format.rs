//! Expression rendering for traces and diagnostics.

use crate::expr::{Expr, ExprId, Literal};
use crate::global::Global;
use pretty::{Arena, DocAllocator, DocBuilder};

struct Pretty<'a> {
  g: &'a Global,
  arena: &'a Arena<'a, ()>,
}

type Doc<'a> = DocBuilder<'a, Arena<'a, ()>, ()>;

impl<'a> Pretty<'a> {
  fn with<R>(g: &Global, f: impl for<'b> FnOnce(&'b Pretty<'b>) -> R) -> R {
    let arena = Arena::new();
    f(&Pretty { g, arena: &arena })
  }

  /// `prec` is true when the term sits in argument position and must be
  /// parenthesized if it is an application or binder.
  fn term(&'a self, prec: bool, e: ExprId) -> Doc<'a> {
    match self.g.exprs.get(e) {
      Expr::BVar(i) => self.arena.text(format!("#{i}")),
      Expr::FVar(v) => self.arena.text(format!("x{}", v.0)),
      Expr::MVar(m) => self.arena.text(format!("?m{}", m.0)),
      Expr::Sort(0) => self.arena.text("Prop"),
      Expr::Sort(l) => self.arena.text(format!("Sort {l}")),
      Expr::Const(n) => self.arena.text(self.g.names.get(n).to_owned()),
      Expr::App(..) => {
        let head = self.term(true, self.g.exprs.get_app_fn(e));
        let doc = (self.g.exprs.get_app_args(e).into_iter())
          .fold(head, |doc, arg| doc.append(self.arena.line()).append(self.term(true, arg)))
          .group();
        if prec {
          doc.parens()
        } else {
          doc
        }
      }
      Expr::Lam { ty, body } => self.binder("fun", " =>", ty, body, prec),
      Expr::Pi { ty, body } => self.binder("∀", ",", ty, body, prec),
      Expr::Lit(Literal::Nat(n)) => self.arena.text(n.to_string()),
      Expr::Lit(Literal::Str(s)) => self.arena.text(format!("{s:?}")),
      Expr::MData(x) => self.term(prec, x),
      Expr::Proj(n, i, x) => self
        .term(true, x)
        .append(self.arena.text(format!(".{}.{i}", self.g.names.get(n)))),
    }
  }

  fn binder(&'a self, kw: &'a str, sep: &'a str, ty: ExprId, body: ExprId, prec: bool) -> Doc<'a> {
    let doc = (self.arena.text(kw))
      .append(self.arena.text(" (_ : "))
      .append(self.term(false, ty))
      .append(self.arena.text(")"))
      .append(self.arena.text(sep))
      .append(self.arena.line())
      .append(self.term(false, body))
      .group();
    if prec {
      doc.parens()
    } else {
      doc
    }
  }
}

pub struct DisplayExpr<'a>(&'a Global, ExprId);

impl std::fmt::Display for DisplayExpr<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Pretty::with(self.0, |p| p.term(false, self.1).render_fmt(100, f))
  }
}

impl Global {
  /// Render an expression for a trace or diagnostic message.
  pub fn pp(&self, e: ExprId) -> DisplayExpr<'_> { DisplayExpr(self, e) }
}

#[cfg(test)]
mod tests {
  use crate::global::Global;
  use crate::Config;

  #[test]
  fn renders_applications() {
    let mut g = Global::new(Config::default());
    let f = g.add_const("f", None);
    let e = {
      let f = g.exprs.mk_const(f);
      let (a, b) = (g.exprs.mk_nat(1), g.exprs.mk_nat(2));
      g.exprs.mk_app_spine(f, &[a, b])
    };
    assert_eq!(g.pp(e).to_string(), "f 1 2");
  }

  #[test]
  fn renders_props_and_binders() {
    let g = Global::new(Config::default());
    let prop = g.exprs.mk_sort(0);
    assert_eq!(g.pp(prop).to_string(), "Prop");
  }
}
