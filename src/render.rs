//! Tree-walking renderer.

use std::collections::HashMap;
use std::fmt::Write;

use log::trace;

use crate::ast::{Expression, ForNode, IfdefNode, Node, Template};
use crate::error::{EvalError, RenderError};
use crate::eval::{self, EvalContext};
use crate::value::{Context, Value};

/// Render state for one call: the caller's context plus a stack of loop
/// scopes. Inner scopes shadow outer ones and the caller's context.
struct Renderer<'a> {
    globals: &'a Context,
    scopes: Vec<HashMap<String, Value>>,
}

impl EvalContext for Renderer<'_> {
    fn get_var(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
    }
}

fn eval_failed(expression: &Expression) -> impl FnOnce(EvalError) -> RenderError + '_ {
    move |source| RenderError::Eval {
        expression: expression.source.clone(),
        position: expression.position,
        source,
    }
}

impl<'a> Renderer<'a> {
    fn new(globals: &'a Context) -> Self {
        Self {
            globals,
            scopes: Vec::new(),
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains_key(name)) || self.globals.contains(name)
    }

    fn render<W: Write + ?Sized>(
        &mut self,
        nodes: &[Node],
        out: &mut W,
    ) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Literal(text) => out.write_str(text)?,
                Node::Expression(expression) => {
                    let value =
                        eval::evaluate(&expression.expr, &*self).map_err(eval_failed(expression))?;
                    write!(out, "{}", value)?;
                }
                Node::If(node) => {
                    let condition = &node.condition;
                    let taken = eval::evaluate_to_bool(&condition.expr, &*self)
                        .map_err(eval_failed(condition))?;
                    if taken {
                        self.render(&node.children, out)?;
                    } else {
                        self.render(&node.else_branch.children, out)?;
                    }
                }
                Node::Ifdef(node) => self.render_ifdef(node, out)?,
                Node::For(node) => self.render_for(node, out)?,
            }
        }
        Ok(())
    }

    fn render_ifdef<W: Write + ?Sized>(
        &mut self,
        node: &IfdefNode,
        out: &mut W,
    ) -> Result<(), RenderError> {
        if self.is_bound(&node.name) != node.negated {
            self.render(&node.children, out)
        } else {
            self.render(&node.else_branch.children, out)
        }
    }

    fn render_for<W: Write + ?Sized>(
        &mut self,
        node: &ForNode,
        out: &mut W,
    ) -> Result<(), RenderError> {
        let iterations =
            eval::iterate(&node.head, &*self).map_err(eval_failed(&node.head.iterable))?;
        trace!(
            "{}: looping {} times over `{}`",
            node.position,
            iterations.len(),
            node.head.iterable.source
        );

        for bindings in iterations {
            self.scopes.push(bindings.into_iter().collect());
            let result = self.render(&node.body, out);
            self.scopes.pop();
            result?;
        }
        Ok(())
    }
}

impl Template {
    /// Renders into a caller-provided sink.
    ///
    /// On error the sink may hold partial output; it is not a valid result.
    pub fn render_to<W: Write + ?Sized>(
        &self,
        out: &mut W,
        context: &Context,
    ) -> Result<(), RenderError> {
        Renderer::new(context).render(&self.children, out)
    }

    pub fn render(&self, context: &Context) -> Result<String, RenderError> {
        let mut output = String::new();
        self.render_to(&mut output, context)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TemplateParser;

    fn render(text: &str, ctx: &Context) -> String {
        TemplateParser::new().parse(text).unwrap().render(ctx).unwrap()
    }

    #[test]
    fn loop_scope_shadows_and_is_dropped() {
        let ctx = Context::new().with("x", "outer").with("xs", vec![1, 2]);
        assert_eq!(
            render("{{for x in xs}}{{x}},{{endfor}}{{x}}", &ctx),
            "1,2,outer"
        );
    }

    #[test]
    fn nested_loops_see_outer_bindings() {
        let ctx = Context::new()
            .with("rows", vec!["a", "b"])
            .with("cols", vec![1, 2]);
        assert_eq!(
            render("{{for r in rows}}{{for c in cols}}{{r}}{{c}} {{endfor}}{{endfor}}", &ctx),
            "a1 a2 b1 b2 "
        );
    }

    #[test]
    fn ifdef_sees_loop_variables() {
        let ctx = Context::new().with("xs", vec![0]);
        assert_eq!(
            render(
                "{{for v in xs}}{{ifdef v}}yes{{endif}}{{endfor}}{{ifdef v}}leak{{endif}}",
                &ctx
            ),
            "yes"
        );
    }

    #[test]
    fn scopes_are_restored_after_an_error_in_the_body() {
        let template = TemplateParser::new()
            .parse("{{for x in xs}}{{1 / x}}{{endfor}}")
            .unwrap();
        let ctx = Context::new().with("xs", vec![1, 0]);
        let mut renderer = Renderer::new(&ctx);
        let mut out = String::new();
        let err = renderer.render(template.children(), &mut out).unwrap_err();
        assert!(matches!(err, RenderError::Eval { source: EvalError::DivisionByZero, .. }));
        assert!(renderer.scopes.is_empty());
        assert_eq!(out, "1.0");
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write_str(&mut self, _: &str) -> std::fmt::Result {
            Err(std::fmt::Error)
        }
    }

    #[test]
    fn sink_errors_surface_as_write_errors() {
        let template = TemplateParser::new().parse("text").unwrap();
        let err = template.render_to(&mut FailingSink, &Context::new()).unwrap_err();
        assert_eq!(err, RenderError::Write(std::fmt::Error));
    }
}
