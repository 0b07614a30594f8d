use eyre::Result;
use stencil_ast::{
    BinaryOp, CallParamValue, Callee, ContentKind, ExprId, ExprKind, FileNode, LetValue, NodeId,
    NodeKind, Span, Type, UnaryOp,
};

use super::{FilePass, PassContext, PassId};

/// Resolve declared parameter and state types, then type every expression
/// reachable from a template.
///
/// Method calls are bound here since their lookup depends on the receiver
/// type.
pub struct ResolveTypes;

/// Variables in scope with their types, innermost last.
type Scope = Vec<(String, Type)>;

impl FilePass for ResolveTypes {
    fn id(&self) -> PassId {
        PassId::ResolveTypes
    }

    fn run(&self, file: &mut FileNode, ctx: &mut PassContext<'_>) -> Result<()> {
        for id in file.templates.clone() {
            let mut scope = resolve_header(file, id, ctx);
            let body = file.template(id).map(|t| t.body.clone()).unwrap_or_default();
            walk(file, &body, &mut scope, ctx);
        }
        Ok(())
    }
}

fn report(file: &FileNode, span: Span, message: String, ctx: &mut PassContext<'_>) {
    let location = file.location(span);
    ctx.diagnostics
        .error(PassId::ResolveTypes.name(), message, location);
}

fn resolve_header(file: &mut FileNode, id: NodeId, ctx: &mut PassContext<'_>) -> Scope {
    let Some(template) = file.template(id) else {
        return Scope::new();
    };
    let params: Vec<(String, String, Span)> = template
        .params
        .iter()
        .map(|p| (p.name.clone(), p.type_expr.clone(), p.span))
        .collect();
    let state: Vec<(String, Option<String>, ExprId, Span)> = template
        .state
        .iter()
        .map(|s| (s.name.clone(), s.type_expr.clone(), s.default, s.span))
        .collect();

    let mut scope = Scope::new();
    let mut param_types = Vec::with_capacity(params.len());
    for (name, type_expr, span) in params {
        let ty = match ctx.config.type_registry().resolve(&type_expr) {
            Ok(ty) => ty,
            Err(err) => {
                report(file, span, err.to_string(), ctx);
                Type::Unknown
            }
        };
        scope.push((name, ty.clone()));
        param_types.push(ty);
    }

    let mut state_types = Vec::with_capacity(state.len());
    for (name, type_expr, default, span) in state {
        let inferred = type_expr_of(file, default, &scope, ctx);
        let ty = match type_expr {
            Some(type_expr) => match ctx.config.type_registry().resolve(&type_expr) {
                Ok(ty) => {
                    if !ty.is_assignable_from(&inferred) {
                        report(
                            file,
                            span,
                            format!(
                                "default of state '{}' has type {}, expected {}",
                                name, inferred, ty
                            ),
                            ctx,
                        );
                    }
                    ty
                }
                Err(err) => {
                    report(file, span, err.to_string(), ctx);
                    Type::Unknown
                }
            },
            None => inferred,
        };
        scope.push((name, ty.clone()));
        state_types.push(ty);
    }

    if let Some(template) = file.template_mut(id) {
        for (param, ty) in template.params.iter_mut().zip(param_types) {
            param.ty = Some(ty);
        }
        for (decl, ty) in template.state.iter_mut().zip(state_types) {
            decl.ty = Some(ty);
        }
    }
    scope
}

fn walk(file: &mut FileNode, body: &[NodeId], scope: &mut Scope, ctx: &mut PassContext<'_>) {
    let depth = scope.len();
    for &id in body {
        let kind = file.node(id).kind.clone();
        match kind {
            NodeKind::For(node) => {
                let iterable = type_expr_of(file, node.iterable, scope, ctx);
                let element = match iterable {
                    Type::List(element) => *element,
                    ty if ty.is_loose() => Type::Unknown,
                    ty => {
                        let span = file.expr(node.iterable).span;
                        report(file, span, format!("cannot iterate over {}", ty), ctx);
                        Type::Unknown
                    }
                };
                scope.push((node.var, element));
                walk(file, &node.body, scope, ctx);
                scope.pop();
            }
            NodeKind::Let(node) => {
                let ty = match node.value {
                    LetValue::Expr(expr) => type_expr_of(file, expr, scope, ctx),
                    LetValue::Content { kind, body } => {
                        walk(file, &body, scope, ctx);
                        content_type(kind)
                    }
                };
                scope.push((node.var, ty));
            }
            NodeKind::Call(node) => {
                for param in node.params {
                    match param.value {
                        CallParamValue::Expr(expr) => {
                            type_expr_of(file, expr, scope, ctx);
                        }
                        CallParamValue::Content { body, .. } => walk(file, &body, scope, ctx),
                    }
                }
            }
            kind => {
                for root in kind.expr_roots() {
                    type_expr_of(file, root, scope, ctx);
                }
                for list in kind.child_lists() {
                    walk(file, list, scope, ctx);
                }
            }
        }
    }
    scope.truncate(depth);
}

/// The type of a `{let}` or `{param}` block of the given kind.
pub(crate) fn content_type(kind: ContentKind) -> Type {
    match kind {
        ContentKind::Html => Type::Html,
        ContentKind::Attributes => Type::Attributes,
        ContentKind::Text => Type::String,
        ContentKind::Uri => Type::Uri,
        ContentKind::Css => Type::Css,
        ContentKind::Js => Type::Js,
    }
}

fn type_expr_of(file: &mut FileNode, id: ExprId, scope: &Scope, ctx: &mut PassContext<'_>) -> Type {
    let kind = file.expr(id).kind.clone();
    let span = file.expr(id).span;
    let ty = match kind {
        ExprKind::Literal(literal) => literal.ty(),
        ExprKind::Var(name) => scope
            .iter()
            .rev()
            .find(|(var, _)| *var == name)
            .map(|(_, ty)| ty.clone())
            .unwrap_or(Type::Unknown),
        ExprKind::Global(_) => Type::Unknown,
        ExprKind::Field { base, field } => match type_expr_of(file, base, scope, ctx) {
            Type::Map(_, value) => *value,
            ty if ty.is_loose() => Type::Unknown,
            ty => {
                report(file, span, format!("type {} has no field '{}'", ty, field), ctx);
                Type::Unknown
            }
        },
        ExprKind::FunctionCall { name, args, callee } => {
            let arg_types: Vec<Type> = args.iter().map(|a| type_expr_of(file, *a, scope, ctx)).collect();
            match callee {
                Some(callee) => {
                    check_args(file, &name, &callee, &args, &arg_types, ctx);
                    callee.return_type()
                }
                None => Type::Unknown,
            }
        }
        ExprKind::MethodCall { base, name, args, .. } => {
            let receiver = type_expr_of(file, base, scope, ctx);
            let arg_types: Vec<Type> = args.iter().map(|a| type_expr_of(file, *a, scope, ctx)).collect();
            match ctx
                .config
                .plugin_resolver()
                .resolve_method(&name, &receiver, args.len())
            {
                Ok(resolved) => {
                    check_args(file, &name, &resolved, &args, &arg_types, ctx);
                    let returns = resolved.return_type();
                    if let ExprKind::MethodCall { callee, .. } = &mut file.expr_mut(id).kind {
                        *callee = Some(resolved);
                    }
                    returns
                }
                Err(message) => {
                    report(file, span, message, ctx);
                    Type::Unknown
                }
            }
        }
        ExprKind::List(items) => {
            let element = items
                .iter()
                .map(|item| type_expr_of(file, *item, scope, ctx))
                .reduce(|a, b| a.join(&b))
                .unwrap_or(Type::Unknown);
            Type::list(element)
        }
        ExprKind::Unary { op, operand } => {
            let operand = type_expr_of(file, operand, scope, ctx);
            match op {
                UnaryOp::Not => Type::Bool,
                UnaryOp::Neg if operand.is_numeric() => operand,
                UnaryOp::Neg if operand.is_loose() => Type::Unknown,
                UnaryOp::Neg => {
                    report(
                        file,
                        span,
                        format!("operator '-' requires a number, found {}", operand),
                        ctx,
                    );
                    Type::Unknown
                }
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let left = type_expr_of(file, lhs, scope, ctx);
            let right = type_expr_of(file, rhs, scope, ctx);
            match binary_type(op, &left, &right) {
                Some(ty) => ty,
                None => {
                    report(
                        file,
                        span,
                        format!(
                            "operator '{}' cannot be applied to {} and {}",
                            op.symbol(),
                            left,
                            right
                        ),
                        ctx,
                    );
                    Type::Unknown
                }
            }
        }
    };
    file.expr_mut(id).ty = Some(ty.clone());
    ty
}

fn binary_type(op: BinaryOp, left: &Type, right: &Type) -> Option<Type> {
    if op.is_logical() || op.is_comparison() {
        return Some(Type::Bool);
    }
    if op == BinaryOp::Add && (*left == Type::String || *right == Type::String) {
        return Some(Type::String);
    }
    if left.is_numeric() && right.is_numeric() {
        let both_int = *left == Type::Int && *right == Type::Int;
        return Some(if op == BinaryOp::Div || !both_int {
            Type::Float
        } else {
            Type::Int
        });
    }
    let loose_or_numeric = |ty: &Type| ty.is_loose() || ty.is_numeric();
    if loose_or_numeric(left) && loose_or_numeric(right) {
        return Some(Type::Unknown);
    }
    None
}

fn check_args(
    file: &FileNode,
    name: &str,
    callee: &Callee,
    args: &[ExprId],
    arg_types: &[Type],
    ctx: &mut PassContext<'_>,
) {
    let Callee::Plugin { params, .. } = callee else {
        return;
    };
    for (i, ((param, arg), arg_ty)) in params.iter().zip(args).zip(arg_types).enumerate() {
        if !param.is_assignable_from(arg_ty) {
            let span = file.expr(*arg).span;
            report(
                file,
                span,
                format!(
                    "argument {} of '{}' must be {}, found {}",
                    i + 1,
                    name,
                    param,
                    arg_ty
                ),
                ctx,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::{
        resolve::ResolvePlugins,
        testing::{messages, parse, run_file_pass},
    };

    fn typed(src: &str) -> (FileNode, Vec<String>) {
        let mut file = parse(src);
        let mut diagnostics = run_file_pass(&ResolvePlugins, &mut file);
        assert!(diagnostics.is_empty(), "{:?}", messages(&diagnostics));
        diagnostics = run_file_pass(&ResolveTypes, &mut file);
        let messages = messages(&diagnostics);
        (file, messages)
    }

    fn binary_types(file: &FileNode) -> Vec<Type> {
        file.reachable_exprs()
            .into_iter()
            .filter(|id| matches!(file.expr(*id).kind, ExprKind::Binary { .. }))
            .map(|id| file.expr(id).ty())
            .collect()
    }

    #[test]
    fn test_declared_types() {
        let (file, messages) = typed(
            "{namespace a}{template .t}{@param items: list<int>}{@param bad: widget}\
             {for $i in $items}{$i + 1}{$i / 2}{/for}{$bad + 1}{/template}",
        );
        assert_eq!(messages, vec!["unknown type 'widget'"]);

        let (_, template) = file.templates().next().unwrap();
        assert_eq!(template.params[0].ty, Some(Type::list(Type::Int)));
        assert_eq!(template.params[1].ty, Some(Type::Unknown));
        assert_eq!(binary_types(&file), vec![Type::Int, Type::Float, Type::Unknown]);
    }

    #[test]
    fn test_operator_and_argument_errors() {
        let (_, messages) = typed(
            "{namespace a}{template .t}{@param name: string}{@param n: int}\
             {$name - 1}{round($name)}{-$name}{for $x in $n}{/for}{/template}",
        );
        assert_eq!(
            messages,
            vec![
                "operator '-' cannot be applied to string and int",
                "argument 1 of 'round' must be float, found string",
                "operator '-' requires a number, found string",
                "cannot iterate over int",
            ]
        );
    }

    #[test]
    fn test_methods_are_bound() {
        let (file, messages) = typed(
            "{namespace a}{template .t}{@param name: string}{$name.trim()}{$name.length() > 2}{/template}",
        );
        assert!(messages.is_empty());
        let callees: Vec<_> = file
            .reachable_exprs()
            .into_iter()
            .filter_map(|id| match &file.expr(id).kind {
                ExprKind::MethodCall { callee, .. } => callee.clone(),
                _ => None,
            })
            .map(|callee| callee.return_type())
            .collect();
        assert_eq!(callees, vec![Type::String, Type::Int]);
        assert!(matches!(
            file.reachable_exprs()
                .into_iter()
                .find_map(|id| match &file.expr(id).kind {
                    ExprKind::MethodCall { callee, .. } => callee.clone(),
                    _ => None,
                }),
            Some(Callee::Plugin { .. })
        ));
    }

    #[test]
    fn test_state_and_let_types() {
        let (file, messages) = typed(
            "{namespace a}{element .e}{@state count: int = 'x'}{@state open = false}\
             {let $label kind=\"text\"}hi{/let}{let $sum: 1 + 2.5 /}<p>{$label + $sum}</p>{/element}",
        );
        assert_eq!(
            messages,
            vec!["default of state 'count' has type string, expected int"]
        );
        let (_, template) = file.templates().next().unwrap();
        assert_eq!(template.state[1].ty, Some(Type::Bool));
        assert_eq!(binary_types(&file), vec![Type::Float, Type::String]);
    }
}
