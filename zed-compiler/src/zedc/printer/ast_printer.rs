use crate::zedc::{
    ast::{
        Assignment, Case, Decl, Def, Expr, FStringElem, FromElem, Nulls, Op, Order, PoolName,
        PoolSpec, RecordElem, Select, Seq, SortExpr, Source, SourceArgs, VectorElem, zed::Type,
    },
    printer::{
        PREC_ADD, PREC_CMP, PREC_COND, PREC_NEG, PREC_NOT, PREC_OR, PREC_POSTFIX,
        PREC_PRIMARY, Writer, is_identifier, operand_precedence, precedence,
    },
    zson::formatter::quote_string,
};

/// Prints syntax trees as Zed source the parser accepts.
#[derive(Debug, Default)]
pub struct AstPrinter {
    w: Writer,
}

impl AstPrinter {
    pub fn finish(self) -> String {
        self.w.finish()
    }

    /// A whole program. Leading declarations are written bare, the way a
    /// query file states them.
    pub fn query(&mut self, seq: &Seq) {
        if let [Op::Scope { decls, body, .. }] = seq.as_slice() {
            if !decls.is_empty() {
                self.decls(decls);
                self.seq(body);
                return;
            }
        }
        self.seq(seq);
    }

    pub fn seq(&mut self, seq: &Seq) {
        for (i, op) in seq.iter().enumerate() {
            if i > 0 {
                self.w.newline();
                self.w.push("| ");
            }
            self.op(op);
        }
    }

    fn decls(&mut self, decls: &[Decl]) {
        for d in decls {
            self.decl(d);
            self.w.newline();
        }
    }

    fn decl(&mut self, d: &Decl) {
        match d {
            Decl::Const { name, expr, .. } => {
                self.w.push(&format!("const {name} = "));
                self.expr(expr, PREC_COND);
                self.w.push(";");
            }
            Decl::Func {
                name, params, expr, ..
            } => {
                self.w.push(&format!("fn {name}({}): (", params.join(", ")));
                self.expr(expr, PREC_COND);
                self.w.push(")");
            }
            Decl::Op {
                name, params, body, ..
            } => {
                self.w.push(&format!("op {name}({}): (", params.join(", ")));
                self.w.open();
                self.w.newline();
                match body.as_slice() {
                    [Op::Scope { decls, body, .. }] if !decls.is_empty() => {
                        self.decls(decls);
                        self.seq(body);
                    }
                    _ => self.seq(body),
                }
                self.w.close();
                self.w.newline();
                self.w.push(")");
            }
            Decl::Type { name, ty, .. } => {
                self.w.push(&format!("type {} = ", type_name(name)));
                self.ty(ty);
            }
        }
    }

    fn block(&mut self, body: &Seq) {
        self.w.push("(");
        self.w.open();
        self.w.newline();
        self.seq(body);
        self.w.close();
        self.w.newline();
        self.w.push(")");
    }

    pub fn op(&mut self, op: &Op) {
        match op {
            Op::From { elems, .. } => self.from(elems),
            Op::Scope { decls, body, .. } => {
                self.w.push("(");
                self.w.open();
                self.w.newline();
                self.decls(decls);
                self.seq(body);
                self.w.close();
                self.w.newline();
                self.w.push(")");
            }
            Op::Parallel { paths, .. } => {
                self.w.push("fork (");
                self.w.open();
                for path in paths {
                    self.w.newline();
                    self.w.push("=> ");
                    self.seq(path);
                }
                self.w.close();
                self.w.newline();
                self.w.push(")");
            }
            Op::Sequential { body, .. } => self.block(body),
            Op::Switch { expr, cases, .. } => {
                self.w.push("switch ");
                if let Some(e) = expr {
                    self.expr(e, PREC_COND);
                    self.w.push(" ");
                }
                self.w.push("(");
                self.w.open();
                for case in cases {
                    self.w.newline();
                    self.case(case);
                }
                self.w.close();
                self.w.newline();
                self.w.push(")");
            }
            Op::Search { expr, .. } => {
                if is_match_all(expr) {
                    self.w.push("*");
                } else if has_term(expr) || !is_search(expr) {
                    self.w.push("search ");
                    self.search(expr, PREC_OR);
                } else {
                    self.search(expr, PREC_OR);
                }
            }
            Op::Where { expr, .. } => {
                self.w.push("where ");
                self.expr(expr, PREC_COND);
            }
            Op::Cut { args, .. } => self.assignments_op("cut", args),
            Op::Pick { args, .. } => self.assignments_op("pick", args),
            Op::Put { args, .. } => self.assignments_op("put", args),
            Op::Rename { args, .. } => self.assignments_op("rename", args),
            Op::Drop { args, .. } => {
                self.w.push("drop");
                if !args.is_empty() {
                    self.w.push(" ");
                    self.exprs(args);
                }
            }
            Op::Sort {
                args,
                reverse,
                nulls_first,
                ..
            } => {
                self.w.push("sort");
                if *reverse {
                    self.w.push(" -r");
                }
                if *nulls_first {
                    self.w.push(" -nulls first");
                }
                if !args.is_empty() {
                    self.w.push(" ");
                    self.exprs(args);
                }
            }
            Op::Top {
                limit, args, flush, ..
            } => {
                self.w.push("top");
                if let Some(n) = limit {
                    self.w.push(" ");
                    self.expr(n, PREC_PRIMARY);
                }
                if *flush {
                    self.w.push(" -flush");
                }
                if !args.is_empty() {
                    self.w.push(" ");
                    self.exprs(args);
                }
            }
            Op::Head { count, .. } => self.opt_arg("head", count.as_ref()),
            Op::Tail { count, .. } => self.opt_arg("tail", count.as_ref()),
            Op::Sample { expr, .. } => self.opt_arg("sample", expr.as_ref()),
            Op::Uniq { cflag, .. } => self.w.push(if *cflag { "uniq -c" } else { "uniq" }),
            Op::Fuse { .. } => self.w.push("fuse"),
            Op::Shape { .. } => self.w.push("shape"),
            Op::Pass { .. } => self.w.push("pass"),
            Op::Join {
                style,
                right,
                left_key,
                right_key,
                args,
                ..
            } => {
                if style != "inner" {
                    self.w.push(style);
                    self.w.push(" ");
                }
                self.w.push("join ");
                if let Some(right) = right {
                    self.block(right);
                    self.w.push(" ");
                }
                self.w.push("on ");
                self.expr(left_key, PREC_POSTFIX);
                self.w.push("=");
                self.expr(right_key, PREC_POSTFIX);
                if !args.is_empty() {
                    self.w.push(" ");
                    self.assignments(args);
                }
            }
            Op::Summarize {
                every,
                keys,
                aggs,
                limit,
                ..
            } => {
                self.w.push("summarize");
                if let Some(d) = every {
                    self.w.push(" every ");
                    self.expr(d, PREC_PRIMARY);
                }
                if !aggs.is_empty() {
                    self.w.push(" ");
                    self.assignments(aggs);
                }
                if !keys.is_empty() {
                    self.w.push(" by ");
                    self.assignments(keys);
                }
                if let Some(n) = limit {
                    self.w.push(&format!(" with -limit {n}"));
                }
            }
            Op::Explode { args, ty, as_, .. } => {
                self.w.push("explode ");
                self.exprs(args);
                if let Some(t) = ty {
                    self.w.push(" by ");
                    self.ty(t);
                }
                if let Some(e) = as_ {
                    self.w.push(" as ");
                    self.expr(e, PREC_POSTFIX);
                }
            }
            Op::Merge { expr, .. } => {
                self.w.push("merge ");
                self.expr(expr, PREC_COND);
            }
            Op::Over {
                exprs,
                locals,
                body,
                ..
            } => {
                self.w.push("over ");
                self.exprs(exprs);
                self.locals(locals);
                if let Some(body) = body {
                    self.w.push(" => ");
                    self.block(body);
                }
            }
            Op::Yield { exprs, .. } => {
                self.w.push("yield ");
                self.exprs(exprs);
            }
            Op::Load {
                pool,
                branch,
                author,
                message,
                meta,
                ..
            } => {
                self.w.push("load ");
                self.w.push(pool);
                if let Some(b) = branch {
                    self.w.push(&format!("@{b}"));
                }
                for (kw, v) in [("author", author), ("message", message), ("meta", meta)] {
                    if let Some(v) = v {
                        self.w.push(&format!(" {kw} {}", quote_string(v)));
                    }
                }
            }
            Op::OpAssignment { assignments, .. } => self.assignments(assignments),
            Op::OpExpr { expr, .. } => self.search(expr, PREC_OR),
            Op::Select(_)
            | Op::Limit { .. }
            | Op::OrderBy { .. }
            | Op::With { .. }
            | Op::Union { .. } => self.sql_query(op),
            Op::SqlPipe { .. }
            | Op::SqlJoin { .. }
            | Op::CrossJoin { .. }
            | Op::Alias { .. }
            | Op::Ordinality { .. }
            | Op::Table { .. } => {
                self.w.push("select * from ");
                self.table_ref(op);
            }
        }
    }

    fn case(&mut self, case: &Case) {
        match &case.expr {
            Some(e) => {
                self.w.push("case ");
                self.expr(e, PREC_COND);
            }
            None => self.w.push("default"),
        }
        self.w.push(" => ");
        self.seq(&case.path);
    }

    fn opt_arg(&mut self, kw: &str, arg: Option<&Expr>) {
        self.w.push(kw);
        if let Some(e) = arg {
            self.w.push(" ");
            self.expr(e, PREC_COND);
        }
    }

    fn assignments_op(&mut self, kw: &str, args: &[Assignment]) {
        self.w.push(kw);
        self.w.push(" ");
        self.assignments(args);
    }

    fn assignments(&mut self, args: &[Assignment]) {
        for (i, a) in args.iter().enumerate() {
            if i > 0 {
                self.w.push(", ");
            }
            if let Some(lhs) = &a.lhs {
                self.expr(lhs, PREC_POSTFIX);
                self.w.push(":=");
            }
            self.expr(&a.rhs, PREC_COND);
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.w.push(", ");
            }
            self.expr(e, PREC_COND);
        }
    }

    fn locals(&mut self, locals: &[Def]) {
        for (i, d) in locals.iter().enumerate() {
            self.w.push(if i == 0 { " with " } else { ", " });
            self.w.push(&d.name);
            self.w.push("=");
            self.expr(&d.expr, PREC_COND);
        }
    }

    fn from(&mut self, elems: &[FromElem]) {
        if let [elem] = elems {
            if elem.body.is_none() {
                let kw = match elem.source {
                    Source::Name { .. } => "from",
                    Source::Pool { .. } => "pool",
                    Source::File { .. } => "file",
                    Source::Http { .. } => "get",
                };
                self.w.push(kw);
                self.w.push(" ");
                self.source(&elem.source);
                self.source_args(&elem.args);
                return;
            }
        }
        self.w.push("from (");
        self.w.open();
        for elem in elems {
            self.w.newline();
            self.source(&elem.source);
            self.source_args(&elem.args);
            if let Some(body) = &elem.body {
                self.w.push(" => ");
                self.seq(body);
            }
        }
        self.w.close();
        self.w.newline();
        self.w.push(")");
    }

    fn source(&mut self, src: &Source) {
        match src {
            Source::Name { spec, .. } | Source::Pool { spec, .. } => self.pool_spec(spec),
            Source::File { path, .. } => self.w.push(&word(path)),
            Source::Http { url, .. } => {
                if is_url(url) {
                    self.w.push(url)
                } else {
                    self.w.push(&quote_string(url))
                }
            }
        }
    }

    fn pool_spec(&mut self, spec: &PoolSpec) {
        match &spec.pool {
            Some(PoolName::Text { name }) if name.contains(['*', '?']) => {
                self.w.push(&quote_string(name))
            }
            Some(PoolName::Text { name }) => self.w.push(&word(name)),
            Some(PoolName::Glob { pattern }) => self.w.push(pattern),
            Some(PoolName::Regexp { pattern }) => self.w.push(&format!("/{pattern}/")),
            None => {}
        }
        if let Some(c) = &spec.commit {
            self.w.push(&format!("@{c}"));
        }
        if let Some(m) = &spec.meta {
            self.w.push(&format!(":{m}"));
        }
    }

    fn source_args(&mut self, args: &SourceArgs) {
        if let Some(f) = &args.format {
            self.w.push(&format!(" format {f}"));
        }
        if let Some((field, order)) = &args.order {
            self.w.push(&format!(" order {field}:{}", order_text(*order)));
        }
        if let Some(m) = &args.method {
            self.w.push(&format!(" method {m}"));
        }
        if let Some(h) = &args.headers {
            self.w.push(" headers ");
            self.expr(h, PREC_COND);
        }
        if let Some(b) = &args.body {
            self.w.push(&format!(" body {}", quote_string(b)));
        }
    }

    // SQL

    fn sql_query(&mut self, op: &Op) {
        match op {
            Op::With { ctes, body, .. } => {
                self.w.push("with ");
                for (i, cte) in ctes.iter().enumerate() {
                    if i > 0 {
                        self.w.push(", ");
                    }
                    self.w.push(&format!("{} as (", cte.name));
                    self.sql_query(&cte.body);
                    self.w.push(")");
                }
                self.w.push(" ");
                self.sql_query(body);
            }
            Op::Limit { op, count, .. } => {
                self.sql_query(op);
                self.w.push(" limit ");
                self.expr(count, PREC_COND);
            }
            Op::OrderBy { op, exprs, .. } => {
                self.sql_query(op);
                self.w.push(" order by ");
                for (i, s) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.w.push(", ");
                    }
                    self.sort_item(s);
                }
            }
            Op::Union {
                distinct,
                left,
                right,
                ..
            } => {
                self.sql_query(left);
                self.w.push(if *distinct { " union " } else { " union all " });
                self.sql_query(right);
            }
            Op::Select(s) => self.select(s),
            other => self.op(other),
        }
    }

    fn sort_item(&mut self, s: &SortExpr) {
        self.expr(&s.expr, PREC_COND);
        if let Some(o) = s.order {
            self.w.push(" ");
            self.w.push(order_text(o));
        }
        match s.nulls {
            Some(Nulls::First) => self.w.push(" nulls first"),
            Some(Nulls::Last) => self.w.push(" nulls last"),
            None => {}
        }
    }

    fn select(&mut self, s: &Select) {
        self.w.push("select ");
        if s.distinct {
            self.w.push("distinct ");
        } else if s.value {
            self.w.push("value ");
        }
        for (i, a) in s.selection.iter().enumerate() {
            if i > 0 {
                self.w.push(", ");
            }
            match (&a.lhs, &a.rhs) {
                (None, Expr::This { .. }) => self.w.push("*"),
                (lhs, rhs) => {
                    self.expr(rhs, PREC_COND);
                    if let Some(Expr::Id { name, .. }) = lhs {
                        self.w.push(" as ");
                        self.w.push(&field_name(name));
                    }
                }
            }
        }
        if let Some(from) = &s.from {
            self.w.push(" from ");
            self.table_ref(from);
        }
        if let Some(e) = &s.where_ {
            self.w.push(" where ");
            self.expr(e, PREC_COND);
        }
        if !s.group_by.is_empty() {
            self.w.push(" group by ");
            self.exprs(&s.group_by);
        }
        if let Some(e) = &s.having {
            self.w.push(" having ");
            self.expr(e, PREC_COND);
        }
    }

    fn table_ref(&mut self, op: &Op) {
        match op {
            Op::Table { name, .. } => {
                if is_identifier(name) && !is_sql_keyword(name) {
                    self.w.push(name)
                } else {
                    self.w.push(&quote_string(name))
                }
            }
            Op::SqlPipe { ops, .. } => self.block(ops),
            Op::Alias { op, name, .. } => {
                self.table_ref(op);
                self.w.push(" as ");
                self.w.push(name);
            }
            Op::Ordinality { op, .. } => {
                self.table_ref(op);
                self.w.push(" with ordinality");
            }
            Op::SqlJoin {
                style,
                left,
                right,
                cond,
                ..
            } => {
                self.table_ref(left);
                self.w.push(" ");
                if style != "inner" {
                    self.w.push(style);
                    self.w.push(" ");
                }
                self.w.push("join ");
                self.table_ref(right);
                self.w.push(" on ");
                self.expr(cond, PREC_COND);
            }
            Op::CrossJoin { left, right, .. } => {
                self.table_ref(left);
                self.w.push(" cross join ");
                self.table_ref(right);
            }
            other => {
                self.w.push("(");
                self.sql_query(other);
                self.w.push(")");
            }
        }
    }

    // Expressions

    /// A search expression: `and`, `or` and `!` combine terms, globs and
    /// regexps, and anything else must be a comparison.
    fn search(&mut self, e: &Expr, min: u8) {
        match e {
            Expr::Binary { op, lhs, rhs, .. } if op == "or" || op == "and" => {
                let p = precedence(op);
                self.paren(p < min, |this| {
                    this.search(lhs, p);
                    this.w.push(&format!(" {op} "));
                    this.search(rhs, p + 1);
                });
            }
            Expr::Unary { op, operand, .. } if op == "!" => {
                self.paren(PREC_NOT < min, |this| {
                    this.w.push("!");
                    this.search(operand, PREC_NOT);
                });
            }
            Expr::Term { text, .. } => self.w.push(text),
            Expr::Glob { pattern, .. } => self.w.push(pattern),
            Expr::Regexp { pattern, .. } => self.w.push(&format!("/{pattern}/")),
            _ => self.expr(e, PREC_CMP),
        }
    }

    fn paren(&mut self, wrap: bool, f: impl FnOnce(&mut Self)) {
        if wrap {
            self.w.push("(");
        }
        f(self);
        if wrap {
            self.w.push(")");
        }
    }

    pub fn expr(&mut self, e: &Expr, min: u8) {
        self.paren(expr_precedence(e) < min, |this| this.expr_inner(e));
    }

    fn expr_inner(&mut self, e: &Expr) {
        match e {
            Expr::Id { name, .. } => self.w.push(name),
            Expr::This { .. } => self.w.push("this"),
            Expr::Primitive { ty, text, .. } => match ty.as_str() {
                "string" => self.w.push(&quote_string(text)),
                "null" => self.w.push("null"),
                _ => self.w.push(text),
            },
            Expr::TypeValue { value, .. } => {
                self.w.push("<");
                self.ty(value);
                self.w.push(">");
            }
            Expr::Unary { op, operand, .. } => {
                self.w.push(op);
                let p = if op == "!" { PREC_NOT } else { PREC_NEG };
                self.expr(operand, p);
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let (l, r) = operand_precedence(op);
                self.expr(lhs, l);
                self.w.push(&format!(" {op} "));
                self.expr(rhs, r);
            }
            Expr::Dot { lhs, rhs, .. } => {
                self.expr(lhs, PREC_POSTFIX);
                self.w.push(".");
                self.w.push(&field_name(rhs));
            }
            Expr::Index { expr, index, .. } => {
                self.expr(expr, PREC_POSTFIX);
                self.w.push("[");
                self.expr(index, PREC_COND);
                self.w.push("]");
            }
            Expr::Slice { expr, from, to, .. } => {
                self.expr(expr, PREC_POSTFIX);
                self.w.push("[");
                if let Some(f) = from {
                    self.expr(f, PREC_OR);
                }
                self.w.push(":");
                if let Some(t) = to {
                    self.expr(t, PREC_OR);
                }
                self.w.push("]");
            }
            Expr::Conditional {
                cond, then, else_, ..
            } => {
                self.expr(cond, PREC_OR);
                self.w.push(" ? ");
                self.expr(then, PREC_COND);
                self.w.push(" : ");
                self.expr(else_, PREC_COND);
            }
            Expr::Call {
                name, args, where_, ..
            } => {
                self.w.push(name);
                self.w.push("(");
                self.exprs(args);
                self.w.push(")");
                if let Some(w) = where_ {
                    self.w.push(" where ");
                    self.expr(w, PREC_COND);
                }
            }
            Expr::Cast { expr, ty, .. } => {
                self.w.push("cast(");
                self.expr(expr, PREC_COND);
                self.w.push(", <");
                self.ty(ty);
                self.w.push(">)");
            }
            Expr::Record { elems, .. } => {
                self.w.push("{");
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        self.w.push(", ");
                    }
                    match elem {
                        RecordElem::Field { name, value, .. } => {
                            self.w.push(&field_name(name));
                            self.w.push(":");
                            self.expr(value, PREC_COND);
                        }
                        RecordElem::Identifier { name, .. } => self.w.push(name),
                        RecordElem::Spread { expr, .. } => {
                            self.w.push("...");
                            self.expr(expr, PREC_COND);
                        }
                    }
                }
                self.w.push("}");
            }
            Expr::Array { elems, .. } => {
                self.w.push("[");
                self.vector(elems);
                self.w.push("]");
            }
            Expr::Set { elems, .. } => {
                self.w.push("|[");
                self.vector(elems);
                self.w.push("]|");
            }
            Expr::Map { entries, .. } => {
                self.w.push("|{");
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        self.w.push(", ");
                    }
                    self.expr(&entry.key, PREC_OR);
                    self.w.push(":");
                    self.expr(&entry.value, PREC_COND);
                }
                self.w.push("}|");
            }
            Expr::Regexp { pattern, .. } => self.w.push(&format!("/{pattern}/")),
            Expr::Glob { pattern, .. } => self.w.push(pattern),
            Expr::Term { text, .. } => self.w.push(text),
            Expr::FString { elems, .. } => {
                self.w.push("f\"");
                for elem in elems {
                    match elem {
                        FStringElem::Text { text } => self.w.push(&fstring_text(text)),
                        FStringElem::Expr { expr } => {
                            self.w.push("{");
                            self.expr(expr, PREC_COND);
                            self.w.push("}");
                        }
                    }
                }
                self.w.push("\"");
            }
            Expr::Over {
                exprs,
                locals,
                body,
                ..
            } => {
                self.w.push("(over ");
                self.exprs(exprs);
                self.locals(locals);
                self.w.push(" | ");
                self.seq(body);
                self.w.push(")");
            }
        }
    }

    fn vector(&mut self, elems: &[VectorElem]) {
        for (i, elem) in elems.iter().enumerate() {
            if i > 0 {
                self.w.push(", ");
            }
            match elem {
                VectorElem::Value { expr } => self.expr(expr, PREC_COND),
                VectorElem::Spread { expr, .. } => {
                    self.w.push("...");
                    self.expr(expr, PREC_COND);
                }
            }
        }
    }

    pub fn ty(&mut self, t: &Type) {
        match t {
            Type::Primitive { name } => self.w.push(name),
            Type::Record { fields } => {
                self.w.push("{");
                for (i, f) in fields.iter().enumerate() {
                    if i > 0 {
                        self.w.push(",");
                    }
                    self.w.push(&field_name(&f.name));
                    self.w.push(":");
                    self.ty(&f.ty);
                }
                self.w.push("}");
            }
            Type::Array { ty } => {
                self.w.push("[");
                self.ty(ty);
                self.w.push("]");
            }
            Type::Set { ty } => {
                self.w.push("|[");
                self.ty(ty);
                self.w.push("]|");
            }
            Type::Map { key, val } => {
                self.w.push("|{");
                self.ty(key);
                self.w.push(":");
                self.ty(val);
                self.w.push("}|");
            }
            Type::Union { types } => {
                self.w.push("(");
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        self.w.push(",");
                    }
                    self.ty(t);
                }
                self.w.push(")");
            }
            Type::Enum { symbols } => self.w.push(&format!("enum({})", symbols.join(","))),
            Type::Error { ty } => {
                self.w.push("error(");
                self.ty(ty);
                self.w.push(")");
            }
            Type::Name { name } => self.w.push(&type_name(name)),
            Type::Def { name, ty } => {
                self.w.push(&type_name(name));
                self.w.push("=");
                self.ty(ty);
            }
        }
    }
}

fn is_match_all(e: &Expr) -> bool {
    matches!(e, Expr::Primitive { ty, text, .. } if ty == "bool" && text == "true")
}

fn expr_precedence(e: &Expr) -> u8 {
    match e {
        Expr::Conditional { .. } => PREC_COND,
        Expr::Call {
            where_: Some(_), ..
        } => PREC_COND,
        Expr::Binary { op, .. } => precedence(op),
        Expr::Unary { op, .. } if op == "!" => PREC_NOT,
        Expr::Unary { .. } => PREC_NEG,
        Expr::Primitive { text, .. } if text.starts_with('-') => PREC_NEG,
        Expr::Dot { .. } | Expr::Index { .. } | Expr::Slice { .. } => PREC_POSTFIX,
        Expr::Term { .. } | Expr::Glob { .. } => PREC_ADD,
        _ => PREC_PRIMARY,
    }
}

/// True when a logical combination contains a bare search term.
fn has_term(e: &Expr) -> bool {
    match e {
        Expr::Term { .. } => true,
        Expr::Binary { op, lhs, rhs, .. } if op == "and" || op == "or" => {
            has_term(lhs) || has_term(rhs)
        }
        Expr::Unary { op, operand, .. } if op == "!" => has_term(operand),
        _ => false,
    }
}

fn is_search(e: &Expr) -> bool {
    match e {
        Expr::Regexp { .. } | Expr::Glob { .. } | Expr::Term { .. } => true,
        Expr::Binary { op, lhs, rhs, .. } if op == "and" || op == "or" => {
            is_search(lhs) || is_search(rhs)
        }
        Expr::Unary { op, operand, .. } if op == "!" => is_search(operand),
        _ => false,
    }
}

fn order_text(o: Order) -> &'static str {
    match o {
        Order::Asc => "asc",
        Order::Desc => "desc",
    }
}

fn field_name(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        quote_string(name)
    }
}

fn type_name(name: &str) -> String {
    let bare = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'));
    if bare { name.to_string() } else { quote_string(name) }
}

/// A pool or file name, bare when it reads back as a single word.
fn word(name: &str) -> String {
    let bare = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '/' | '-' | '*' | '?'));
    if bare { name.to_string() } else { quote_string(name) }
}

fn is_url(s: &str) -> bool {
    (s.starts_with("http://") || s.starts_with("https://"))
        && !s.contains(|c: char| c.is_whitespace() || c == '|' || c == ')')
}

fn is_sql_keyword(name: &str) -> bool {
    const SQL: &[&str] = &[
        "from", "where", "group", "having", "order", "limit", "union", "join", "inner", "left",
        "right", "anti", "cross", "on", "as", "with", "select",
    ];
    SQL.iter().any(|k| k.eq_ignore_ascii_case(name))
}

fn fstring_text(text: &str) -> String {
    let quoted = quote_string(text);
    let body = &quoted[1..quoted.len() - 1];
    body.replace('{', "\\{")
}
