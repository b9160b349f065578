//! Declarations: `const`, `fn`, `op` and `type`.

use crate::zedc::{
    analyzer::{
        Analyzer,
        errors::CompileError,
        scope::{Entry, OpDef},
    },
    ast, dag, eval,
    parser::location::Loc,
    zson::{self, formatter::format_type},
};
use std::rc::Rc;

impl Analyzer<'_> {
    /// Binds `decls` in the current frame. Constants and types bind in order;
    /// every function name binds before any body is analyzed so functions
    /// may call one another.
    pub(crate) fn sem_decls(
        &mut self,
        decls: &[ast::Decl],
    ) -> Result<(Vec<dag::Def>, Vec<dag::Func>), CompileError> {
        let mut consts = Vec::new();
        let mut funcs = Vec::new();
        for d in decls {
            match d {
                ast::Decl::Const { name, expr, loc } => {
                    let e = eval::fold(self.zctx, self.sem_expr(expr)?);
                    self.define(name, Entry::Const(e.clone()), *loc)?;
                    consts.push(dag::Def {
                        name: name.clone(),
                        expr: e,
                    });
                }
                ast::Decl::Type { name, ty, loc } => {
                    let e = self.sem_type_decl(name, ty, *loc)?;
                    self.define(name, Entry::Const(e.clone()), *loc)?;
                    consts.push(dag::Def {
                        name: name.clone(),
                        expr: e,
                    });
                }
                ast::Decl::Op {
                    name,
                    params,
                    body,
                    loc,
                } => {
                    let def = OpDef {
                        name: name.clone(),
                        params: params.clone(),
                        body: body.clone(),
                        loc: *loc,
                        frame: Rc::downgrade(&self.scope.frame()),
                    };
                    self.define(name, Entry::Op(Rc::new(def)), *loc)?;
                }
                ast::Decl::Func { .. } => funcs.push(d),
            }
        }
        for d in &funcs {
            if let ast::Decl::Func {
                name, params, loc, ..
            } = d
            {
                self.define(name, Entry::Func(params.len()), *loc)?;
            }
        }
        let mut out = Vec::with_capacity(funcs.len());
        for d in funcs {
            if let ast::Decl::Func {
                name, params, expr, ..
            } = d
            {
                out.push(dag::Func {
                    name: name.clone(),
                    params: params.clone(),
                    expr: self.sem_func_body(params, expr)?,
                });
            }
        }
        tracing::trace!(consts = consts.len(), funcs = out.len(), "bound declarations");
        Ok((consts, out))
    }

    fn define(&self, name: &str, entry: Entry, loc: Loc) -> Result<(), CompileError> {
        self.scope
            .define(name, entry)
            .map_err(|msg| CompileError::name(msg, loc))
    }

    fn sem_func_body(&mut self, params: &[String], body: &ast::Expr) -> Result<dag::Expr, CompileError> {
        self.scope.enter();
        let out = self.sem_func_body_inner(params, body);
        self.scope.exit();
        out
    }

    fn sem_func_body_inner(
        &mut self,
        params: &[String],
        body: &ast::Expr,
    ) -> Result<dag::Expr, CompileError> {
        for p in params {
            self.scope
                .define_var(p)
                .map_err(|msg| CompileError::name(msg, body.loc()))?;
        }
        self.sem_expr(body)
    }

    /// Interns `name` as an alias and returns its type value.
    fn sem_type_decl(&mut self, name: &str, ty: &ast::zed::Type, loc: Loc) -> Result<dag::Expr, CompileError> {
        let under = zson::Analyzer::new(self.zctx)
            .convert_type(ty)
            .map_err(|e| CompileError::type_error(e.to_string(), loc))?;
        let alias = self
            .zctx
            .lookup_type_alias(name, &under)
            .map_err(|e| CompileError::type_error(e.to_string(), loc))?;
        Ok(dag::Expr::literal(format!("<{}>", format_type(&alias))))
    }

    /// Binds `over ... with` locals as variables, each evaluated before it is bound.
    pub(crate) fn sem_vars(&mut self, defs: &[ast::Def]) -> Result<Vec<dag::Def>, CompileError> {
        let mut out = Vec::with_capacity(defs.len());
        for def in defs {
            let expr = self.sem_expr(&def.expr)?;
            self.scope
                .define_var(&def.name)
                .map_err(|msg| CompileError::name(msg, def.loc))?;
            out.push(dag::Def {
                name: def.name.clone(),
                expr,
            });
        }
        Ok(out)
    }

    /// Expands a user operator in place: its parameters become constants
    /// bound to the call's arguments, resolved in the caller's scope.
    pub(crate) fn expand_op(
        &mut self,
        def: Rc<OpDef>,
        args: &[ast::Expr],
        loc: Loc,
    ) -> Result<dag::Seq, CompileError> {
        if self.op_stack.iter().any(|d| Rc::ptr_eq(d, &def)) {
            let mut path: Vec<String> = self.op_stack.iter().map(|d| d.name.clone()).collect();
            path.push(def.name.clone());
            return Err(CompileError::Cycle {
                path,
                loc: Some(loc),
            });
        }
        if args.len() != def.params.len() {
            return Err(CompileError::name(
                format!(
                    "{}: call expects {} argument(s)",
                    def.name,
                    def.params.len()
                ),
                loc,
            ));
        }
        let args = args
            .iter()
            .map(|a| self.sem_expr(a))
            .collect::<Result<Vec<_>, _>>()?;
        let frame = def
            .frame
            .upgrade()
            .ok_or_else(|| CompileError::internal(format!("scope of operator {} is gone", def.name)))?;
        tracing::debug!(op = %def.name, depth = self.op_stack.len(), "expanding user operator");
        let saved = self.scope.enter_from(frame);
        self.op_stack.push(def.clone());
        let out = self.expand_op_body(&def, args);
        self.op_stack.pop();
        self.scope.restore(saved);
        out
    }

    fn expand_op_body(&mut self, def: &OpDef, args: Vec<dag::Expr>) -> Result<dag::Seq, CompileError> {
        for (param, arg) in def.params.iter().zip(args) {
            self.define(param, Entry::Const(arg), def.loc)?;
        }
        self.sem_seq(&def.body)
    }
}

#[cfg(test)]
mod tests {
    use crate::zedc::{
        analyzer::{analyze, errors::CompileError},
        compiler::source::NoLake,
        dag::{self, Expr, Op},
        parser::ZedParser,
        zed::Context,
    };
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    fn sem(q: &str) -> Result<dag::Seq, crate::zedc::analyzer::errors::ErrorList> {
        let zctx = Context::new();
        let seq = ZedParser::parse_query(q).unwrap();
        analyze(&zctx, &seq, &NoLake, None, &CancellationToken::new())
    }

    fn scope_body(seq: dag::Seq) -> (Vec<dag::Def>, Vec<dag::Func>, dag::Seq) {
        match seq.into_iter().next() {
            Some(Op::Scope {
                consts,
                funcs,
                body,
            }) => (consts, funcs, body),
            other => panic!("expected scope, got {other:?}"),
        }
    }

    #[test]
    fn consts_fold_and_inline() {
        let (consts, _, body) = scope_body(sem("const N = 2 + 3 yield N").unwrap());
        assert_eq!(consts[0].expr, Expr::literal("5"));
        assert_eq!(
            body,
            vec![Op::Yield {
                exprs: vec![Expr::literal("5")]
            }]
        );
    }

    #[test]
    fn functions_see_each_other() {
        let (_, funcs, body) =
            scope_body(sem("fn f(x): (g(x) + 1) fn g(y): (y * 2) yield f(a)").unwrap());
        assert_eq!(funcs.len(), 2);
        assert_eq!(funcs[0].params, vec!["x"]);
        assert!(matches!(
            &funcs[0].expr,
            Expr::BinaryExpr { lhs, .. } if matches!(lhs.as_ref(), Expr::Call { name, .. } if name == "g")
        ));
        assert_eq!(
            body,
            vec![Op::Yield {
                exprs: vec![Expr::call("f", vec![Expr::path(["a"])])]
            }]
        );
    }

    #[test]
    fn user_ops_expand_inline() {
        let (_, _, body) = scope_body(sem("op keep(n): ( head n ) keep(3)").unwrap());
        assert_eq!(body, vec![Op::Head { count: 3 }]);
    }

    #[test]
    fn operator_cycles_are_reported() {
        let errs = sem("op a(): ( b() ) op b(): ( a() ) a()").unwrap_err();
        let first = errs.first().unwrap();
        assert_eq!(first.to_string(), "operator cycle found: a -> b -> a");
        assert!(matches!(first, CompileError::Cycle { .. }));
    }

    #[test]
    fn redefinition_is_a_name_error() {
        let errs = sem("const x = 1 const x = 2 pass").unwrap_err();
        assert!(matches!(errs.first(), Some(CompileError::Name { .. })));
    }

    #[test]
    fn type_decls_bind_type_values() {
        let (consts, _, _) = scope_body(sem("type port = uint16 yield port").unwrap());
        assert_eq!(consts[0].expr, Expr::literal("<port=uint16>"));
    }
}
