use std::collections::VecDeque;

use eyre::Result;
use stencil_ast::{
    BinaryOp, ExprId, ExprKind, FileNode, FileSetNode, Literal, NodeId, NodeKind, UnaryOp,
};

use super::{FileSetPass, PassContext, PassId, merge_raw_text};
use crate::registry::TemplateRegistry;

/// Fold constant expressions, prune branches with constant conditions, turn
/// constant prints into text and merge adjacent text.
pub struct Optimize;

impl FileSetPass for Optimize {
    fn id(&self) -> PassId {
        PassId::Optimize
    }

    fn run(
        &self,
        file_set: &mut FileSetNode,
        _registry: &TemplateRegistry,
        _ctx: &mut PassContext<'_>,
    ) -> Result<()> {
        for file in &mut file_set.files {
            let mut folded = 0usize;
            for id in file.reachable_exprs().into_iter().rev() {
                if let Some(literal) = fold(file, id) {
                    let expr = file.expr_mut(id);
                    expr.ty = Some(literal.ty());
                    expr.kind = ExprKind::Literal(literal);
                    folded += 1;
                }
            }

            file.rewrite_child_lists(|file, list| {
                let mut out = Vec::with_capacity(list.len());
                let mut pending: VecDeque<NodeId> = list.into();
                while let Some(id) = pending.pop_front() {
                    match simplify(file, id) {
                        Simplified::Keep => out.push(id),
                        Simplified::Drop => {}
                        Simplified::Splice(body) => {
                            for node in body.into_iter().rev() {
                                pending.push_front(node);
                            }
                        }
                    }
                }
                merge_raw_text(file, out)
            });
            tracing::trace!(file = %file.path, folded, "optimized");
        }
        Ok(())
    }
}

enum Simplified {
    Keep,
    Drop,
    Splice(Vec<NodeId>),
}

fn simplify(file: &mut FileNode, id: NodeId) -> Simplified {
    match &file.node(id).kind {
        NodeKind::If(node) => {
            let mut branches = Vec::new();
            let mut else_body = node.else_body.clone();
            for branch in &node.branches {
                match file.expr(branch.cond).as_literal() {
                    Some(cond) if cond.is_truthy() => {
                        else_body = Some(branch.body.clone());
                        break;
                    }
                    Some(_) => {}
                    None => branches.push(branch.clone()),
                }
            }
            if branches.is_empty() {
                return Simplified::Splice(else_body.unwrap_or_default());
            }
            if let NodeKind::If(node) = &mut file.node_mut(id).kind {
                node.branches = branches;
                node.else_body = else_body;
            }
            Simplified::Keep
        }
        NodeKind::Print(print) if print.directives.is_empty() => {
            let Some(literal) = file.expr(print.expr).as_literal() else {
                return Simplified::Keep;
            };
            let text = literal.to_output();
            if text.contains(['<', '>', '&', '"', '\'']) {
                return Simplified::Keep;
            }
            if text.is_empty() {
                return Simplified::Drop;
            }
            file.node_mut(id).kind = NodeKind::RawText(text);
            Simplified::Keep
        }
        _ => Simplified::Keep,
    }
}

fn fold(file: &FileNode, id: ExprId) -> Option<Literal> {
    match &file.expr(id).kind {
        ExprKind::Unary { op, operand } => {
            let operand = file.expr(*operand).as_literal()?;
            match (op, operand) {
                (UnaryOp::Not, value) => Some(Literal::Bool(!value.is_truthy())),
                (UnaryOp::Neg, Literal::Int(i)) => i.checked_neg().map(Literal::Int),
                (UnaryOp::Neg, Literal::Float(f)) => Some(Literal::Float(-f)),
                _ => None,
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let lhs = file.expr(*lhs).as_literal()?;
            let rhs = file.expr(*rhs).as_literal()?;
            fold_binary(*op, lhs, rhs)
        }
        _ => None,
    }
}

fn number(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Int(i) => Some(*i as f64),
        Literal::Float(f) => Some(*f),
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, lhs: &Literal, rhs: &Literal) -> Option<Literal> {
    use Literal::{Bool, Float, Int};

    match op {
        BinaryOp::And => return Some(Bool(lhs.is_truthy() && rhs.is_truthy())),
        BinaryOp::Or => return Some(Bool(lhs.is_truthy() || rhs.is_truthy())),
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (number(lhs), number(rhs)) {
                (Some(a), Some(b)) => a == b,
                _ => lhs == rhs,
            };
            return Some(Bool(equal == (op == BinaryOp::Eq)));
        }
        _ => {}
    }
    if op == BinaryOp::Add
        && (matches!(lhs, Literal::String(_)) || matches!(rhs, Literal::String(_)))
    {
        return Some(Literal::String(format!("{}{}", lhs.to_output(), rhs.to_output())));
    }

    if let (Int(a), Int(b)) = (lhs, rhs) {
        return match op {
            BinaryOp::Add => a.checked_add(*b).map(Int),
            BinaryOp::Sub => a.checked_sub(*b).map(Int),
            BinaryOp::Mul => a.checked_mul(*b).map(Int),
            BinaryOp::Mod if *b != 0 => a.checked_rem(*b).map(Int),
            BinaryOp::Div if *b != 0 => Some(Float(*a as f64 / *b as f64)),
            BinaryOp::Lt => Some(Bool(a < b)),
            BinaryOp::Gt => Some(Bool(a > b)),
            BinaryOp::Le => Some(Bool(a <= b)),
            BinaryOp::Ge => Some(Bool(a >= b)),
            _ => None,
        };
    }

    let (a, b) = (number(lhs)?, number(rhs)?);
    match op {
        BinaryOp::Add => Some(Float(a + b)),
        BinaryOp::Sub => Some(Float(a - b)),
        BinaryOp::Mul => Some(Float(a * b)),
        BinaryOp::Div if b != 0.0 => Some(Float(a / b)),
        BinaryOp::Lt => Some(Bool(a < b)),
        BinaryOp::Gt => Some(Bool(a > b)),
        BinaryOp::Le => Some(Bool(a <= b)),
        BinaryOp::Ge => Some(Bool(a >= b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{body_text, parse, run_file_set_pass};

    #[test]
    fn test_optimize() {
        let mut set = FileSetNode::new(vec![parse(
            "{namespace a}{template .t}{@param x: int}\
             {'a' + 1}{2 * 3 - 1}{if false}no{elseif $x}maybe{else}other{/if}\
             {if 1 < 2}yes{else}no{/if}{'<b>'}{10 / 0}{7 % 2}{null}\
             {/template}",
        )]);
        let diagnostics = run_file_set_pass(&Optimize, &mut set);
        assert!(diagnostics.is_empty());

        let file = &set.files[0];
        let (_, template) = file.templates().next().unwrap();
        assert_eq!(body_text(file, &template.body), "a15|if|yes|print|print|1");

        let NodeKind::If(node) = &file.node(template.body[1]).kind else {
            panic!("expected an if");
        };
        assert_eq!(node.branches.len(), 1);
        assert!(node.else_body.is_some());
    }

    #[test]
    fn test_fold_binary() {
        use Literal::*;
        assert_eq!(fold_binary(BinaryOp::Div, &Int(7), &Int(2)), Some(Float(3.5)));
        assert_eq!(fold_binary(BinaryOp::Mod, &Int(7), &Int(0)), None);
        assert_eq!(fold_binary(BinaryOp::Eq, &Int(1), &Float(1.0)), Some(Bool(true)));
        assert_eq!(fold_binary(BinaryOp::Add, &Int(i64::MAX), &Int(1)), None);
        assert_eq!(fold_binary(BinaryOp::Sub, &String("a".into()), &Int(1)), None);
    }
}
