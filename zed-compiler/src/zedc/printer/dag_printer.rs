use crate::zedc::{
    dag::{Assignment, Case, Def, Expr, Op, Order, Path, RecordElem, Seq, SortKey, VectorElem},
    printer::{
        PREC_CMP, PREC_COND, PREC_NEG, PREC_NOT, PREC_OR, PREC_POSTFIX, PREC_PRIMARY, Writer,
        is_identifier, operand_precedence, precedence,
    },
    zson::formatter::quote_string,
};

#[derive(Debug, Default)]
pub struct DagPrinter {
    w: Writer,
}

impl DagPrinter {
    pub fn finish(self) -> String {
        self.w.finish()
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

    fn block(&mut self, kw: &str, body: impl FnOnce(&mut Self)) {
        self.w.push(kw);
        self.w.push("(");
        self.w.open();
        body(self);
        self.w.close();
        self.w.newline();
        self.w.push(")");
    }

    pub fn op(&mut self, op: &Op) {
        match op {
            Op::DefaultScan { filter } => {
                self.w.push("reader");
                self.pushdown("filter", filter.as_ref());
            }
            Op::FileScan {
                path,
                format,
                sort_key,
                filter,
                fields,
            } => {
                self.w.push(&format!("file {}", quote_string(path)));
                self.opt_word("format", format.as_deref());
                self.sort_key(sort_key.as_ref());
                self.pushdown("filter", filter.as_ref());
                self.fields(fields.as_deref());
            }
            Op::HttpScan {
                url,
                format,
                method,
                headers,
                body,
                sort_key,
            } => {
                self.w.push(&format!("get {url}"));
                self.opt_word("format", format.as_deref());
                self.opt_word("method", method.as_deref());
                if let Some(h) = headers {
                    self.w.push(" headers ");
                    self.expr(h, PREC_COND);
                }
                if let Some(b) = body {
                    self.w.push(&format!(" body {}", quote_string(b)));
                }
                self.sort_key(sort_key.as_ref());
            }
            Op::PoolScan {
                id,
                commit,
                filter,
                key_pruner,
                fields,
            } => {
                self.w.push(&format!("pool {id}@{commit}"));
                self.pushdown("filter", filter.as_ref());
                self.pushdown("pruner", key_pruner.as_ref());
                self.fields(fields.as_deref());
            }
            Op::PoolMetaScan { id, meta } => self.w.push(&format!("pool {id}:{meta}")),
            Op::CommitMetaScan {
                pool,
                commit,
                meta,
                tap,
                key_pruner,
            } => {
                self.w.push(&format!("pool {pool}@{commit}:{meta}"));
                if *tap {
                    self.w.push(" tap");
                }
                self.pushdown("pruner", key_pruner.as_ref());
            }
            Op::LakeMetaScan { meta } => self.w.push(&format!("lake :{meta}")),
            Op::DeleteScan {
                id,
                commit,
                where_,
                key_pruner,
            } => {
                self.w.push(&format!("deleter {id}@{commit}"));
                self.pushdown("where", where_.as_ref());
                self.pushdown("pruner", key_pruner.as_ref());
            }
            Op::Scope {
                consts,
                funcs,
                body,
            } => self.block("scope ", |this| {
                for c in consts {
                    this.w.newline();
                    this.w.push(&format!("const {} = ", c.name));
                    this.expr(&c.expr, PREC_COND);
                }
                for f in funcs {
                    this.w.newline();
                    this.w.push(&format!("fn {}({}): (", f.name, f.params.join(", ")));
                    this.expr(&f.expr, PREC_COND);
                    this.w.push(")");
                }
                this.w.newline();
                this.seq(body);
            }),
            Op::Fork {
                paths,
                merge_by,
                merge_reverse,
            } => {
                self.block("fork ", |this| {
                    for path in paths {
                        this.w.newline();
                        this.w.push("=> ");
                        this.seq(path);
                    }
                });
                if let Some(key) = merge_by {
                    let dir = if *merge_reverse { "desc" } else { "asc" };
                    self.w.push(&format!(" merge {}:{dir}", path_text(key)));
                }
            }
            Op::Switch { expr, cases } => {
                self.w.push("switch ");
                if let Some(e) = expr {
                    self.expr(e, PREC_COND);
                    self.w.push(" ");
                }
                self.block("", |this| {
                    for case in cases {
                        this.w.newline();
                        this.case(case);
                    }
                });
            }
            Op::Cut { args, quiet } => {
                self.w.push(if *quiet { "cut -quiet " } else { "cut " });
                self.assignments(args);
            }
            Op::Drop { args } => {
                self.w.push("drop ");
                self.exprs(args);
            }
            Op::Explode { args, ty, as_ } => {
                self.w.push("explode ");
                self.exprs(args);
                self.w.push(&format!(" by {ty} as "));
                self.expr(as_, PREC_POSTFIX);
            }
            Op::Filter { expr } => {
                self.w.push("where ");
                self.expr(expr, PREC_COND);
            }
            Op::Fuse => self.w.push("fuse"),
            Op::Head { count } => self.w.push(&format!("head {count}")),
            Op::Tail { count } => self.w.push(&format!("tail {count}")),
            Op::Join {
                style,
                left_key,
                right_key,
                args,
            } => {
                self.w.push(&format!("{style} join on "));
                self.expr(left_key, PREC_POSTFIX);
                self.w.push("=");
                self.expr(right_key, PREC_POSTFIX);
                if !args.is_empty() {
                    self.w.push(" ");
                    self.assignments(args);
                }
            }
            Op::Load {
                pool,
                branch,
                author,
                message,
                meta,
            } => {
                self.w.push(&format!("load {pool}"));
                if let Some(b) = branch {
                    self.w.push(&format!("@{b}"));
                }
                for (kw, v) in [("author", author), ("message", message), ("meta", meta)] {
                    if let Some(v) = v {
                        self.w.push(&format!(" {kw} {}", quote_string(v)));
                    }
                }
            }
            Op::Merge { expr, order } => {
                self.w.push("merge ");
                self.expr(expr, PREC_POSTFIX);
                self.w.push(&format!(":{}", order_text(*order)));
            }
            Op::Over { defs, exprs, body } => {
                self.w.push("over ");
                self.exprs(exprs);
                self.defs(defs);
                if let Some(body) = body {
                    self.block(" => ", |this| {
                        this.w.newline();
                        this.seq(body);
                    });
                }
            }
            Op::Pass => self.w.push("pass"),
            Op::Pick { args } => {
                self.w.push("pick ");
                self.assignments(args);
            }
            Op::Put { args } => {
                self.w.push("put ");
                self.assignments(args);
            }
            Op::Rename { args } => {
                self.w.push("rename ");
                self.assignments(args);
            }
            Op::Shape => self.w.push("shape"),
            Op::Sort {
                args,
                nulls_first,
                reverse,
            } => {
                self.w.push("sort");
                if *reverse {
                    self.w.push(" -r");
                }
                if *nulls_first {
                    self.w.push(" -nulls first");
                }
                for (i, s) in args.iter().enumerate() {
                    self.w.push(if i == 0 { " " } else { ", " });
                    self.expr(&s.key, PREC_COND);
                    self.w.push(" ");
                    self.w.push(order_text(s.order));
                }
            }
            Op::Summarize {
                limit,
                keys,
                aggs,
                input_sort_dir,
                partials_in,
                partials_out,
            } => {
                self.w.push("summarize");
                if *partials_in {
                    self.w.push(" partials-in");
                }
                if *partials_out {
                    self.w.push(" partials-out");
                }
                if *input_sort_dir != 0 {
                    self.w.push(&format!(" sort-dir {input_sort_dir}"));
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
            Op::Top { limit, args, flush } => {
                self.w.push("top");
                if let Some(n) = limit {
                    self.w.push(&format!(" {n}"));
                }
                if *flush {
                    self.w.push(" -flush");
                }
                if !args.is_empty() {
                    self.w.push(" ");
                    self.exprs(args);
                }
            }
            Op::Uniq { cflag } => self.w.push(if *cflag { "uniq -c" } else { "uniq" }),
            Op::Yield { exprs } => {
                self.w.push("yield ");
                self.exprs(exprs);
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

    /// An expression pushed into a scan, parenthesized so it reads as one argument.
    fn pushdown(&mut self, kw: &str, e: Option<&Expr>) {
        if let Some(e) = e {
            self.w.push(&format!(" {kw} ("));
            self.expr(e, PREC_COND);
            self.w.push(")");
        }
    }

    fn opt_word(&mut self, kw: &str, v: Option<&str>) {
        if let Some(v) = v {
            self.w.push(&format!(" {kw} {v}"));
        }
    }

    fn sort_key(&mut self, key: Option<&SortKey>) {
        if let Some(key) = key {
            let paths: Vec<String> = key.keys.iter().map(path_text).collect();
            self.w.push(&format!(" order {}:{}", paths.join(","), order_text(key.order)));
        }
    }

    fn fields(&mut self, fields: Option<&[Path]>) {
        if let Some(fields) = fields {
            let names: Vec<String> = fields.iter().map(path_text).collect();
            self.w.push(&format!(" fields {}", names.join(",")));
        }
    }

    fn assignments(&mut self, args: &[Assignment]) {
        for (i, a) in args.iter().enumerate() {
            if i > 0 {
                self.w.push(", ");
            }
            self.expr(&a.lhs, PREC_POSTFIX);
            self.w.push(":=");
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

    fn defs(&mut self, defs: &[Def]) {
        for (i, d) in defs.iter().enumerate() {
            self.w.push(if i == 0 { " with " } else { ", " });
            self.w.push(&d.name);
            self.w.push("=");
            self.expr(&d.expr, PREC_COND);
        }
    }

    pub fn expr(&mut self, e: &Expr, min: u8) {
        let wrap = expr_precedence(e) < min;
        if wrap {
            self.w.push("(");
        }
        self.expr_inner(e);
        if wrap {
            self.w.push(")");
        }
    }

    fn expr_inner(&mut self, e: &Expr) {
        match e {
            Expr::Agg { name, expr, where_ } => {
                self.w.push(&format!("{name}("));
                if let Some(arg) = expr {
                    self.expr(arg, PREC_COND);
                }
                self.w.push(")");
                if let Some(w) = where_ {
                    self.w.push(" where ");
                    self.expr(w, PREC_COND);
                }
            }
            Expr::ArrayExpr { elems } => {
                self.w.push("[");
                self.vector(elems);
                self.w.push("]");
            }
            Expr::SetExpr { elems } => {
                self.w.push("|[");
                self.vector(elems);
                self.w.push("]|");
            }
            Expr::MapExpr { entries } => {
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
            Expr::RecordExpr { elems } => {
                self.w.push("{");
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        self.w.push(", ");
                    }
                    match elem {
                        RecordElem::Field { name, value } => {
                            self.w.push(&field(name));
                            self.w.push(":");
                            self.expr(value, PREC_COND);
                        }
                        RecordElem::Spread { expr } => {
                            self.w.push("...");
                            self.expr(expr, PREC_COND);
                        }
                    }
                }
                self.w.push("}");
            }
            Expr::BinaryExpr { op, lhs, rhs } => {
                let (l, r) = operand_precedence(op);
                self.expr(lhs, l);
                self.w.push(&format!(" {op} "));
                self.expr(rhs, r);
            }
            Expr::UnaryExpr { op, operand } => {
                self.w.push(op);
                let p = if op == "!" { PREC_NOT } else { PREC_NEG };
                self.expr(operand, p);
            }
            Expr::Call { name, args } => {
                self.w.push(&format!("{name}("));
                self.exprs(args);
                self.w.push(")");
            }
            Expr::MapCall { expr, inner } => {
                self.w.push("map(");
                self.expr(expr, PREC_COND);
                self.w.push(", ");
                self.expr(inner, PREC_COND);
                self.w.push(")");
            }
            Expr::Conditional { cond, then, else_ } => {
                self.expr(cond, PREC_OR);
                self.w.push(" ? ");
                self.expr(then, PREC_COND);
                self.w.push(" : ");
                self.expr(else_, PREC_COND);
            }
            Expr::Dot { lhs, rhs } => {
                self.expr(lhs, PREC_POSTFIX);
                self.w.push(".");
                self.w.push(&field(rhs));
            }
            Expr::IndexExpr { expr, index } => {
                self.expr(expr, PREC_POSTFIX);
                self.w.push("[");
                self.expr(index, PREC_COND);
                self.w.push("]");
            }
            Expr::SliceExpr { expr, from, to } => {
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
            Expr::Literal { value } => self.w.push(value),
            Expr::This { path } => self.w.push(&path_text(path)),
            Expr::Var { name, .. } => self.w.push(name),
            Expr::RegexpMatch { pattern, expr } => {
                self.expr(expr, PREC_CMP + 1);
                self.w.push(&format!(" ~ /{pattern}/"));
            }
            Expr::RegexpSearch { pattern, expr } => {
                self.w.push(&format!("search(/{pattern}/"));
                self.search_target(expr);
            }
            Expr::Search { value, expr, .. } => {
                self.w.push(&format!("search({value}"));
                self.search_target(expr);
            }
            Expr::OverExpr { defs, exprs, body } => {
                self.w.push("(over ");
                self.exprs(exprs);
                self.defs(defs);
                self.w.push(" | ");
                self.seq(body);
                self.w.push(")");
            }
        }
    }

    fn search_target(&mut self, e: &Expr) {
        if !e.is_this() {
            self.w.push(", ");
            self.expr(e, PREC_COND);
        }
        self.w.push(")");
    }

    fn vector(&mut self, elems: &[VectorElem]) {
        for (i, elem) in elems.iter().enumerate() {
            if i > 0 {
                self.w.push(", ");
            }
            match elem {
                VectorElem::VectorValue { expr } => self.expr(expr, PREC_COND),
                VectorElem::Spread { expr } => {
                    self.w.push("...");
                    self.expr(expr, PREC_COND);
                }
            }
        }
    }
}

fn expr_precedence(e: &Expr) -> u8 {
    match e {
        Expr::Conditional { .. } => PREC_COND,
        Expr::Agg {
            where_: Some(_), ..
        } => PREC_COND,
        Expr::BinaryExpr { op, .. } => precedence(op),
        Expr::RegexpMatch { .. } => PREC_CMP,
        Expr::UnaryExpr { op, .. } if op == "!" => PREC_NOT,
        Expr::UnaryExpr { .. } => PREC_NEG,
        Expr::Literal { value } if value.starts_with('-') => PREC_NEG,
        Expr::Dot { .. } | Expr::IndexExpr { .. } | Expr::SliceExpr { .. } => PREC_POSTFIX,
        Expr::This { path } if path.len() > 1 => PREC_POSTFIX,
        _ => PREC_PRIMARY,
    }
}

fn order_text(o: Order) -> &'static str {
    match o {
        Order::Asc => "asc",
        Order::Desc => "desc",
    }
}

fn field(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        quote_string(name)
    }
}

/// `a.b` for a path, with `this[...]` for components that aren't identifiers.
fn path_text(path: &Path) -> String {
    let mut out = String::new();
    for (i, name) in path.iter().enumerate() {
        if is_identifier(name) {
            if i > 0 {
                out.push('.');
            }
            out.push_str(name);
        } else {
            if i == 0 {
                out.push_str("this");
            }
            out.push('[');
            out.push_str(&quote_string(name));
            out.push(']');
        }
    }
    if out.is_empty() {
        out.push_str("this");
    }
    out
}
