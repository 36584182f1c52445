//! Tree-walking evaluator (spec C9, §4.6-§4.13).

pub mod context;
pub mod error;
mod ops;

use std::cmp::Ordering;

pub use context::{
    Cancellation, EvaluationContext, EvaluationOptions, Limits, ProfileValidator, ReferenceResolver,
    TerminologyService,
};
pub use error::{EvalError, EvalErrorKind, EvalResult};

use crate::ast::{BinaryOp, ExprKind, ExprNode, IsAs, Literal, UnaryOp};
use crate::model::types::matches_type;
use crate::model::{Collection, FhirPathValue};
use crate::registry::FunctionRegistry;

/// Evaluates a single AST node against a context, dispatching to the
/// function registry for non-lazy invocations. Checked at every node entry
/// per spec §4.12: cancellation, recursion depth, and (on the way back out)
/// the produced collection's size.
pub fn evaluate(node: &ExprNode, ctx: &EvaluationContext, registry: &FunctionRegistry) -> EvalResult<Collection> {
    ctx.check_cancelled().map_err(|e| e.at(node.offset))?;
    let _guard = ctx.enter_depth().map_err(|e| e.at(node.offset))?;
    let result = eval_kind(node, ctx, registry).map_err(|e| if e.offset.is_some() { e } else { e.at(node.offset) })?;
    ctx.check_size(result.len()).map_err(|e| e.at(node.offset))?;
    Ok(result)
}

fn eval_kind(node: &ExprNode, ctx: &EvaluationContext, registry: &FunctionRegistry) -> EvalResult<Collection> {
    match &node.kind {
        ExprKind::Literal(lit) => Ok(eval_literal(lit)),
        ExprKind::Identifier(name) => Ok(navigate_from_identifier(ctx, name)),
        ExprKind::This => Ok(ctx.this.clone()),
        ExprKind::Index => Ok(ctx.index.map(|i| Collection::single(FhirPathValue::Integer(i))).unwrap_or_default()),
        ExprKind::Total => Ok(ctx.total.clone().unwrap_or_default()),
        ExprKind::ExternalConstant(name) => Ok(ctx.variable(name).unwrap_or_default()),
        ExprKind::Unary(op, operand) => {
            let v = evaluate(operand, ctx, registry)?;
            match op {
                UnaryOp::Plus => ops::unary_plus(&v),
                UnaryOp::Minus => ops::unary_minus(&v),
            }
        }
        ExprKind::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx, registry),
        ExprKind::Path { base, member } => {
            let b = evaluate(base, ctx, registry)?;
            Ok(navigate_field(&b, member))
        }
        ExprKind::Index_ { base, index } => {
            let b = evaluate(base, ctx, registry)?;
            let idx = evaluate(index, ctx, registry)?;
            if idx.is_empty() {
                return Ok(Collection::empty());
            }
            let n = match idx.as_singleton() {
                Some(FhirPathValue::Integer(i)) => *i,
                Some(_) => {
                    return Err(EvalErrorKind::TypeMismatch("indexer requires an Integer index".to_string()).into());
                }
                None => return Err(EvalErrorKind::SingletonExpected(idx.len()).into()),
            };
            if n < 0 || n as usize >= b.len() {
                Ok(Collection::empty())
            } else {
                Ok(Collection::single(b.as_slice()[n as usize].clone()))
            }
        }
        ExprKind::TypeOp { is_as, value, type_name } => {
            let v = evaluate(value, ctx, registry)?;
            match v.as_singleton() {
                None => Ok(Collection::empty()),
                Some(single) => match is_as {
                    IsAs::Is => Ok(Collection::single(FhirPathValue::Boolean(matches_type(single, type_name)))),
                    IsAs::As => {
                        if matches_type(single, type_name) {
                            Ok(v.clone())
                        } else {
                            Ok(Collection::empty())
                        }
                    }
                },
            }
        }
        ExprKind::Paren(inner) => evaluate(inner, ctx, registry),
        ExprKind::Invocation { base, name, args } => eval_invocation(base.as_deref(), name, args, ctx, registry),
    }
}

fn eval_literal(lit: &Literal) -> Collection {
    match lit {
        Literal::Boolean(b) => Collection::single(FhirPathValue::Boolean(*b)),
        Literal::Integer(i) => Collection::single(FhirPathValue::Integer(*i)),
        Literal::Decimal(d) => Collection::single(FhirPathValue::Decimal(*d)),
        Literal::String(s) => Collection::single(FhirPathValue::String(s.clone())),
        Literal::Date(d) => Collection::single(FhirPathValue::Date(*d)),
        Literal::DateTime(dt) => Collection::single(FhirPathValue::DateTime(*dt)),
        Literal::Time(t) => Collection::single(FhirPathValue::Time(*t)),
        Literal::Quantity(v, u) => {
            Collection::single(FhirPathValue::Quantity(crate::model::Quantity::new(*v, u.clone())))
        }
        Literal::Empty => Collection::empty(),
    }
}

/// A bare identifier is either the root resource's own type name (a no-op
/// selecting the root) or a field navigation off `$this` (spec §4.6).
fn navigate_from_identifier(ctx: &EvaluationContext, name: &str) -> Collection {
    if let (Some(FhirPathValue::Object(this_obj)), Some(FhirPathValue::Object(root_obj))) =
        (ctx.this.as_singleton(), ctx.root.as_singleton())
        && this_obj.identity() == root_obj.identity() && this_obj.type_name() == name {
            return ctx.this.clone();
        }
    navigate_field(&ctx.this, name)
}

fn navigate_field(base: &Collection, member: &str) -> Collection {
    let mut out = Vec::new();
    for v in base.iter() {
        if let FhirPathValue::Object(obj) = v
            && let Some(c) = obj.get_field(member) {
                out.extend(c.into_vec());
            }
    }
    Collection::from_vec(out)
}

fn eval_binary(
    op: BinaryOp,
    lhs: &ExprNode,
    rhs: &ExprNode,
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> EvalResult<Collection> {
    match op {
        BinaryOp::And => {
            let l = ops::to_tri(&evaluate(lhs, ctx, registry)?)?;
            if l == Some(false) {
                return Ok(ops::tri_to_collection(Some(false)));
            }
            let r = ops::to_tri(&evaluate(rhs, ctx, registry)?)?;
            Ok(ops::tri_to_collection(ops::and(l, r)))
        }
        BinaryOp::Or => {
            let l = ops::to_tri(&evaluate(lhs, ctx, registry)?)?;
            if l == Some(true) {
                return Ok(ops::tri_to_collection(Some(true)));
            }
            let r = ops::to_tri(&evaluate(rhs, ctx, registry)?)?;
            Ok(ops::tri_to_collection(ops::or(l, r)))
        }
        BinaryOp::Implies => {
            let l = ops::to_tri(&evaluate(lhs, ctx, registry)?)?;
            if l == Some(false) {
                return Ok(ops::tri_to_collection(Some(true)));
            }
            let r = ops::to_tri(&evaluate(rhs, ctx, registry)?)?;
            Ok(ops::tri_to_collection(ops::implies(l, r)))
        }
        BinaryOp::Xor => {
            let l = ops::to_tri(&evaluate(lhs, ctx, registry)?)?;
            let r = ops::to_tri(&evaluate(rhs, ctx, registry)?)?;
            Ok(ops::tri_to_collection(ops::xor(l, r)))
        }
        BinaryOp::Concat => {
            let l = evaluate(lhs, ctx, registry)?;
            let r = evaluate(rhs, ctx, registry)?;
            Ok(Collection::single(ops::concat(l.as_singleton(), r.as_singleton())?))
        }
        BinaryOp::Union => {
            let l = evaluate(lhs, ctx, registry)?;
            let r = evaluate(rhs, ctx, registry)?;
            let mut out: Vec<FhirPathValue> = Vec::new();
            for v in l.iter().chain(r.iter()) {
                if !out.iter().any(|o: &FhirPathValue| o.strict_eq(v) == Some(true)) {
                    out.push(v.clone());
                }
            }
            Ok(Collection::from_vec(out))
        }
        BinaryOp::In | BinaryOp::Contains => {
            let l = evaluate(lhs, ctx, registry)?;
            let r = evaluate(rhs, ctx, registry)?;
            let (needle, haystack) = if op == BinaryOp::In { (&l, &r) } else { (&r, &l) };
            match needle.as_singleton() {
                None => Ok(Collection::empty()),
                Some(v) => {
                    let found = haystack.iter().any(|o| v.strict_eq(o) == Some(true));
                    Ok(Collection::single(FhirPathValue::Boolean(found)))
                }
            }
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let l = evaluate(lhs, ctx, registry)?;
            let r = evaluate(rhs, ctx, registry)?;
            if l.is_empty() || r.is_empty() {
                return Ok(Collection::empty());
            }
            let (Some(a), Some(b)) = (l.as_singleton(), r.as_singleton()) else {
                return Ok(Collection::empty());
            };
            match a.strict_eq(b) {
                Some(eq) => Ok(Collection::single(FhirPathValue::Boolean(if op == BinaryOp::Eq { eq } else { !eq }))),
                None => Ok(Collection::empty()),
            }
        }
        BinaryOp::Equiv | BinaryOp::NotEquiv => {
            let l = evaluate(lhs, ctx, registry)?;
            let r = evaluate(rhs, ctx, registry)?;
            let eq = collections_equivalent(&l, &r);
            Ok(Collection::single(FhirPathValue::Boolean(if op == BinaryOp::Equiv { eq } else { !eq })))
        }
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let l = evaluate(lhs, ctx, registry)?;
            let r = evaluate(rhs, ctx, registry)?;
            if l.is_empty() || r.is_empty() {
                return Ok(Collection::empty());
            }
            let (Some(a), Some(b)) = (l.as_singleton(), r.as_singleton()) else {
                return Err(EvalErrorKind::SingletonExpected(l.len().max(r.len())).into());
            };
            match a.partial_order(b) {
                Ok(None) => Ok(Collection::empty()),
                Ok(Some(ord)) => {
                    let result = match op {
                        BinaryOp::Lt => ord == Ordering::Less,
                        BinaryOp::Gt => ord == Ordering::Greater,
                        BinaryOp::Le => ord != Ordering::Greater,
                        BinaryOp::Ge => ord != Ordering::Less,
                        _ => unreachable!(),
                    };
                    Ok(Collection::single(FhirPathValue::Boolean(result)))
                }
                Err(()) => Err(EvalErrorKind::TypeMismatch(format!(
                    "cannot order {} and {}",
                    a.type_name(),
                    b.type_name()
                ))
                .into()),
            }
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::IntDiv | BinaryOp::Mod => {
            let l = evaluate(lhs, ctx, registry)?;
            let r = evaluate(rhs, ctx, registry)?;
            if l.is_empty() || r.is_empty() {
                return Ok(Collection::empty());
            }
            let (Some(a), Some(b)) = (l.as_singleton(), r.as_singleton()) else {
                return Err(EvalErrorKind::SingletonExpected(l.len().max(r.len())).into());
            };
            let f = match op {
                BinaryOp::Add => ops::add,
                BinaryOp::Sub => ops::sub,
                BinaryOp::Mul => ops::mul,
                BinaryOp::Div => ops::div,
                BinaryOp::IntDiv => ops::int_div,
                BinaryOp::Mod => ops::modulo,
                _ => unreachable!(),
            };
            Ok(Collection::single(f(a, b)?))
        }
    }
}

fn collections_equivalent(l: &Collection, r: &Collection) -> bool {
    if l.is_empty() && r.is_empty() {
        return true;
    }
    if l.len() != r.len() {
        return false;
    }
    l.iter().zip(r.iter()).all(|(a, b)| a.equivalent(b))
}

/// Dispatches a function invocation. Lazy functions (spec §4.7) are
/// special-cased here because they re-enter the AST walk with per-element
/// `$this`/`$index`; everything else evaluates its arguments eagerly and
/// calls into the registry.
fn eval_invocation(
    base: Option<&ExprNode>,
    name: &str,
    args: &[std::sync::Arc<ExprNode>],
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> EvalResult<Collection> {
    let input = match base {
        Some(b) => evaluate(b, ctx, registry)?,
        None => ctx.this.clone(),
    };

    match name {
        "where" if args.len() == 1 => eval_where(&input, &args[0], ctx, registry),
        "select" if args.len() == 1 => eval_select(&input, &args[0], ctx, registry),
        "all" if args.len() == 1 => eval_all(&input, &args[0], ctx, registry),
        "exists" if args.len() == 1 => eval_exists_with_criteria(&input, &args[0], ctx, registry),
        "repeat" if args.len() == 1 => eval_repeat(&input, &args[0], ctx, registry),
        "iif" if args.len() == 2 || args.len() == 3 => eval_iif(args, ctx, registry),
        "aggregate" if args.len() == 1 || args.len() == 2 => eval_aggregate(&input, args, ctx, registry),
        "trace" if args.len() <= 2 => eval_trace(&input, args, ctx, registry),
        _ => {
            let mut evaluated_args = Vec::with_capacity(args.len());
            for a in args {
                evaluated_args.push(evaluate(a, ctx, registry)?);
            }
            registry.call(name, ctx, &input, &evaluated_args)
        }
    }
}

fn eval_where(
    input: &Collection,
    crit: &ExprNode,
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> EvalResult<Collection> {
    let mut out = Vec::new();
    for (idx, elem) in input.iter().enumerate() {
        ctx.check_cancelled()?;
        let iter_ctx = ctx.with_this(Collection::single(elem.clone()), Some(idx as i64));
        let verdict = evaluate(crit, &iter_ctx, registry)?;
        if verdict.singleton_boolean() == Some(true) {
            out.push(elem.clone());
        }
    }
    Ok(Collection::from_vec(out))
}

fn eval_select(
    input: &Collection,
    proj: &ExprNode,
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> EvalResult<Collection> {
    let mut out = Vec::new();
    for (idx, elem) in input.iter().enumerate() {
        ctx.check_cancelled()?;
        let iter_ctx = ctx.with_this(Collection::single(elem.clone()), Some(idx as i64));
        out.extend(evaluate(proj, &iter_ctx, registry)?.into_vec());
    }
    Ok(Collection::from_vec(out))
}

fn eval_all(
    input: &Collection,
    crit: &ExprNode,
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> EvalResult<Collection> {
    for (idx, elem) in input.iter().enumerate() {
        ctx.check_cancelled()?;
        let iter_ctx = ctx.with_this(Collection::single(elem.clone()), Some(idx as i64));
        let verdict = evaluate(crit, &iter_ctx, registry)?;
        if verdict.singleton_boolean() != Some(true) {
            return Ok(Collection::single(FhirPathValue::Boolean(false)));
        }
    }
    Ok(Collection::single(FhirPathValue::Boolean(true)))
}

fn eval_exists_with_criteria(
    input: &Collection,
    crit: &ExprNode,
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> EvalResult<Collection> {
    let filtered = eval_where(input, crit, ctx, registry)?;
    Ok(Collection::single(FhirPathValue::Boolean(!filtered.is_empty())))
}

/// Fixed-point worklist per spec §9: seed = input, union new results by `=`
/// against the accumulator until a round adds nothing.
fn eval_repeat(
    input: &Collection,
    expr: &ExprNode,
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> EvalResult<Collection> {
    let mut accumulated: Vec<FhirPathValue> = input.as_slice().to_vec();
    let mut frontier: Vec<FhirPathValue> = accumulated.clone();
    loop {
        ctx.check_cancelled()?;
        let mut produced = Vec::new();
        for (idx, elem) in frontier.iter().enumerate() {
            let iter_ctx = ctx.with_this(Collection::single(elem.clone()), Some(idx as i64));
            produced.extend(evaluate(expr, &iter_ctx, registry)?.into_vec());
        }
        let mut fresh = Vec::new();
        for item in produced {
            let already_known = accumulated.iter().any(|a| a.strict_eq(&item) == Some(true))
                || fresh.iter().any(|f: &FhirPathValue| f.strict_eq(&item) == Some(true));
            if !already_known {
                fresh.push(item);
            }
        }
        if fresh.is_empty() {
            break;
        }
        ctx.check_size(accumulated.len() + fresh.len())?;
        accumulated.extend(fresh.iter().cloned());
        frontier = fresh;
    }
    Ok(Collection::from_vec(accumulated))
}

/// `iif` evaluates against the ambient context, not per input element — it
/// is a control-flow function, not a collection iterator.
fn eval_iif(
    args: &[std::sync::Arc<ExprNode>],
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> EvalResult<Collection> {
    let cond = evaluate(&args[0], ctx, registry)?;
    match cond.singleton_boolean() {
        Some(true) => evaluate(&args[1], ctx, registry),
        _ => {
            if args.len() > 2 {
                evaluate(&args[2], ctx, registry)
            } else {
                Ok(Collection::empty())
            }
        }
    }
}

fn eval_aggregate(
    input: &Collection,
    args: &[std::sync::Arc<ExprNode>],
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> EvalResult<Collection> {
    let mut total = if args.len() > 1 { evaluate(&args[1], ctx, registry)? } else { Collection::empty() };
    for (idx, elem) in input.iter().enumerate() {
        ctx.check_cancelled()?;
        let iter_ctx = ctx.with_this(Collection::single(elem.clone()), Some(idx as i64)).with_total(total);
        total = evaluate(&args[0], &iter_ctx, registry)?;
    }
    Ok(total)
}

fn eval_trace(
    input: &Collection,
    args: &[std::sync::Arc<ExprNode>],
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> EvalResult<Collection> {
    let name = evaluate(&args[0], ctx, registry)?;
    let name = name.as_singleton().map(|v| v.display_string()).unwrap_or_else(|| "trace".to_string());
    let logged = if args.len() > 1 {
        let proj_ctx = ctx.with_this(input.clone(), None);
        evaluate(&args[1], &proj_ctx, registry)?
    } else {
        input.clone()
    };
    log::info!(target: "fhirpath_eval::trace", "{name}: {logged}");
    Ok(input.clone())
}
