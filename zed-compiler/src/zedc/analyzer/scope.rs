//! Lexically nested name bindings.
//!
//! Frames form a parent-linked chain so a user operator can hold on to the
//! frame it was declared in and expand against it later.

use crate::zedc::{ast, dag, parser::location::Loc};
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::{Rc, Weak},
};

/// A declared operator, expanded inline wherever it is invoked.
#[derive(Debug)]
pub struct OpDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: ast::Seq,
    pub loc: Loc,
    /// The frame the declaration appeared in.
    pub frame: Weak<Frame>,
}

#[derive(Debug, Clone)]
pub enum Entry {
    /// A folded constant or type value.
    Const(dag::Expr),
    /// A user function with this many parameters.
    Func(usize),
    Op(Rc<OpDef>),
    /// A lateral variable or function parameter, as a `Var` expression.
    Var(dag::Expr),
}

#[derive(Debug, Default)]
pub struct Frame {
    parent: Option<Rc<Frame>>,
    entries: RefCell<HashMap<String, Entry>>,
    nvars: Cell<usize>,
}

impl Frame {
    fn lookup(&self, name: &str) -> Option<Entry> {
        if let Some(e) = self.entries.borrow().get(name) {
            return Some(e.clone());
        }
        self.parent.as_ref()?.lookup(name)
    }

    fn total_vars(&self) -> usize {
        self.nvars.get() + self.parent.as_ref().map_or(0, |p| p.total_vars())
    }
}

#[derive(Debug)]
pub struct Scope {
    current: Rc<Frame>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            current: Rc::new(Frame::default()),
        }
    }

    pub fn enter(&mut self) {
        self.current = Rc::new(Frame {
            parent: Some(self.current.clone()),
            ..Frame::default()
        });
    }

    pub fn exit(&mut self) {
        if let Some(parent) = self.current.parent.clone() {
            self.current = parent;
        }
    }

    pub fn frame(&self) -> Rc<Frame> {
        self.current.clone()
    }

    /// Makes a child of `frame` current and returns the frame it replaced.
    pub fn enter_from(&mut self, frame: Rc<Frame>) -> Rc<Frame> {
        let child = Rc::new(Frame {
            parent: Some(frame),
            ..Frame::default()
        });
        std::mem::replace(&mut self.current, child)
    }

    pub fn restore(&mut self, frame: Rc<Frame>) {
        self.current = frame;
    }

    /// Binds `name` in the innermost frame.
    pub fn define(&self, name: &str, entry: Entry) -> Result<(), String> {
        let mut entries = self.current.entries.borrow_mut();
        if entries.contains_key(name) {
            return Err(format!("symbol {name:?} redefined"));
        }
        entries.insert(name.to_string(), entry);
        Ok(())
    }

    /// Binds a variable in the next free slot and returns its expression.
    pub fn define_var(&self, name: &str) -> Result<dag::Expr, String> {
        let var = dag::Expr::Var {
            name: name.to_string(),
            slot: self.current.total_vars(),
        };
        self.define(name, Entry::Var(var.clone()))?;
        self.current.nvars.set(self.current.nvars.get() + 1);
        Ok(var)
    }

    pub fn lookup(&self, name: &str) -> Option<Entry> {
        self.current.lookup(name)
    }

    /// Every const bound in the innermost frame, in name order.
    pub fn local_consts(&self) -> Vec<dag::Def> {
        let entries = self.current.entries.borrow();
        let mut defs: Vec<_> = entries
            .iter()
            .filter_map(|(name, e)| match e {
                Entry::Const(expr) => Some(dag::Def {
                    name: name.clone(),
                    expr: expr.clone(),
                }),
                _ => None,
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_frames_shadow_outer() {
        let mut scope = Scope::new();
        scope
            .define("x", Entry::Const(dag::Expr::literal("1")))
            .unwrap();
        scope.enter();
        scope
            .define("x", Entry::Const(dag::Expr::literal("2")))
            .unwrap();
        assert!(matches!(scope.lookup("x"), Some(Entry::Const(dag::Expr::Literal { value })) if value == "2"));
        scope.exit();
        assert!(matches!(scope.lookup("x"), Some(Entry::Const(dag::Expr::Literal { value })) if value == "1"));
        assert!(scope.lookup("y").is_none());
    }

    #[test]
    fn redefinition_in_one_frame_fails() {
        let scope = Scope::new();
        scope.define("f", Entry::Func(1)).unwrap();
        assert_eq!(
            scope.define("f", Entry::Func(2)).unwrap_err(),
            "symbol \"f\" redefined"
        );
    }

    #[test]
    fn var_slots_count_outer_frames() {
        let mut scope = Scope::new();
        let a = scope.define_var("a").unwrap();
        scope.enter();
        let b = scope.define_var("b").unwrap();
        assert!(matches!(a, dag::Expr::Var { slot: 0, .. }));
        assert!(matches!(b, dag::Expr::Var { slot: 1, .. }));
    }

    #[test]
    fn enter_from_restores() {
        let mut scope = Scope::new();
        scope.define("k", Entry::Func(0)).unwrap();
        let saved = scope.frame();
        scope.enter();
        scope.define("inner", Entry::Func(0)).unwrap();
        let prev = scope.enter_from(saved);
        assert!(scope.lookup("k").is_some());
        assert!(scope.lookup("inner").is_none());
        scope.restore(prev);
        assert!(scope.lookup("inner").is_some());
    }
}
