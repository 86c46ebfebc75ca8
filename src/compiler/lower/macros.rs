use generational_arena::Index;
use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    Interner,
    error::{CompileError, CompileResult},
    parser::{
        Parser,
        node::{MacroArm, MacroParamKind, NodeKind},
    },
    scope::Macro,
    tokens::{Punctuation, Span, Token, TokenKind},
};

use super::LowerCtx;

/// Picks the arm a call with `argc` arguments expands. An arm with no
/// parameters matches zero arguments, and an arm whose parameters are all
/// single matches exactly that many arguments. The first such arm wins;
/// when none matches, the last arm is used so that a trailing variadic arm
/// acts as the catch-all.
pub fn select_arm(mac: &Macro, argc: usize) -> Option<&MacroArm> {
    mac.arms
        .iter()
        .find(|arm| {
            (arm.params.is_empty() && argc == 0)
                || (arm.params.len() == argc && arm.params.iter().all(|p| p.kind == MacroParamKind::Single))
        })
        .or_else(|| mac.arms.last())
}

/// Substitutes `args` into a copy of the arm body and resolves `##` pastes.
/// Never touches the arm itself, so the same arm can be expanded any number
/// of times.
pub fn expand_arm(arm: &MacroArm, args: &[Vec<Token>], interner: &mut Interner) -> Result<Vec<Token>, String> {
    let singles = arm.params.iter().filter(|p| p.kind == MacroParamKind::Single).count();
    let variadic = arm.params.iter().any(|p| p.kind == MacroParamKind::Variadic);
    if (!variadic && args.len() != arm.params.len()) || args.len() < singles {
        return Err(format!(
            "arm takes {}{} argument(s) but {} were supplied",
            if variadic { "at least " } else { "" },
            singles,
            args.len()
        ));
    }

    let param_index = |name: SymbolUsize| arm.params.iter().position(|p| p.name == name);

    let mut substituted = Vec::with_capacity(arm.body.len());
    let mut i = 0;
    while i < arm.body.len() {
        let token = arm.body[i];
        let param = match arm.body.get(i + 1).map(|t| t.kind) {
            Some(TokenKind::Identifier(name)) if token.is_punct(Punctuation::Dollar) => param_index(name),
            _ => None,
        };
        if let Some(j) = param {
            match arm.params[j].kind {
                MacroParamKind::Single => substituted.extend_from_slice(&args[j]),
                MacroParamKind::Variadic => {
                    for (k, arg) in args.iter().skip(j).enumerate() {
                        if k > 0 {
                            substituted.push(Token::new(TokenKind::Punctuation(Punctuation::Comma), token.span));
                        }
                        substituted.extend_from_slice(arg);
                    }
                }
            }
            i += 2;
            continue;
        }
        substituted.push(token);
        i += 1;
    }

    paste_tokens(substituted, interner)
}

/// Joins `a ## b` into one token.
fn paste_tokens(tokens: Vec<Token>, interner: &mut Interner) -> Result<Vec<Token>, String> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        if !token.is_punct(Punctuation::HashHash) {
            out.push(token);
            continue;
        }
        let (Some(lhs), Some(rhs)) = (out.pop(), iter.next()) else {
            return Err("`##` needs a token on both sides".into());
        };
        if !lhs.is_ident_like() || !rhs.is_ident_like() {
            return Err(format!(
                "cannot paste `{}` and `{}`",
                lhs.text(interner),
                rhs.text(interner)
            ));
        }
        let text = format!("{}{}", lhs.text(interner), rhs.text(interner));
        let kind = match text.parse::<i64>() {
            Ok(n) => TokenKind::IntLiteral(n),
            Err(_) => TokenKind::Identifier(interner.get_or_intern(&text)),
        };
        out.push(Token::new(kind, lhs.span.connect_new(&rhs.span)));
    }
    Ok(out)
}

impl<'a> LowerCtx<'a> {
    fn expand_call(&mut self, name: SymbolUsize, args: &[Vec<Token>], span: Span) -> CompileResult<Vec<Token>> {
        let macro_name = self.interner.resolve(name).unwrap_or("<?>").to_string();
        if self.macro_depth >= self.options.macro_depth_limit {
            return Err(CompileError::MalformedMacroInvocation {
                name: macro_name,
                reason: format!("expansion nested deeper than {} levels", self.options.macro_depth_limit),
                span: Some(span.to_display(self.interner)),
            });
        }

        let scope = self.current_scope()?;
        let mac = self.ast.scopes.resolve_macro(scope, name, span, self.interner)?.clone();
        let Some(arm) = select_arm(&mac, args.len()) else {
            return Err(CompileError::MalformedMacroInvocation {
                name: macro_name,
                reason: "macro has no arms".into(),
                span: Some(span.to_display(self.interner)),
            });
        };
        let tokens = expand_arm(arm, args, self.interner).map_err(|reason| CompileError::MalformedMacroInvocation {
            name: macro_name.clone(),
            reason,
            span: Some(span.to_display(self.interner)),
        })?;
        tracing::debug!(name = %macro_name, tokens = tokens.len(), depth = self.macro_depth, "expanded macro");
        Ok(tokens)
    }

    /// Expands a macro call that is the current statement: the body is parsed
    /// as statements, lowered under a temporary root, and spliced in place of
    /// the call.
    pub(super) fn expand_macro_statement(
        &mut self,
        name: SymbolUsize,
        args: &[Vec<Token>],
        span: Span,
    ) -> CompileResult<()> {
        let tokens = self.expand_call(name, args, span)?;
        let block = Parser::new(tokens, self.ast, self.interner).parse_fragment()?;

        self.macro_depth += 1;
        let result = self.lower_fragment(block, span);
        self.macro_depth -= 1;
        result
    }

    /// Expands a macro call nested in an expression. The expansion must be a
    /// single expression; it takes over the call's arena slot.
    pub(super) fn expand_macro_expr(
        &mut self,
        idx: Index,
        name: SymbolUsize,
        args: &[Vec<Token>],
        span: Span,
    ) -> CompileResult<()> {
        let tokens = self.expand_call(name, args, span)?;
        let expr = Parser::new(tokens, self.ast, self.interner).parse_single_expr()?;

        self.macro_depth += 1;
        let result = self.lower_expr(expr);
        self.macro_depth -= 1;
        result?;

        let Some(mut expanded) = self.ast.nodes.remove(expr) else {
            return Err(CompileError::internal("expanded expression vanished", Some(span.to_display(self.interner))));
        };
        if matches!(expanded.kind, NodeKind::MacroCall { .. }) {
            return Err(CompileError::internal(
                "macro call survived expansion",
                Some(span.to_display(self.interner)),
            ));
        }
        expanded.span = span;
        self.ast.nodes[idx] = expanded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::compiler::{
        lexer,
        parser::{display::render_tokens, node::MacroParam},
    };

    fn toks(src: &str, interner: &mut Interner) -> Vec<Token> {
        let file = interner.get_or_intern("m");
        let mut tokens = lexer::tokenize(src, interner, file).unwrap();
        tokens.pop(); // Eof
        tokens
    }

    fn arm(params: &[(&str, MacroParamKind)], body: &str, interner: &mut Interner) -> MacroArm {
        MacroArm {
            params: params
                .iter()
                .map(|(n, k)| MacroParam {
                    name: interner.get_or_intern(n),
                    kind: *k,
                })
                .collect(),
            body: toks(body, interner),
        }
    }

    #[test]
    fn test_single_parameter_substitution() {
        let mut interner = Interner::new();
        let arm = arm(&[("x", MacroParamKind::Single)], "let y = $x + 1;", &mut interner);
        let args = vec![toks("5", &mut interner)];
        let out = expand_arm(&arm, &args, &mut interner).unwrap();
        assert_eq!(render_tokens(&out, &interner), "let y = 5 + 1;");
    }

    #[test]
    fn test_expansion_leaves_arm_untouched() {
        let mut interner = Interner::new();
        let arm = arm(&[("x", MacroParamKind::Single)], "f($x)", &mut interner);
        let before = arm.clone();
        let a = vec![toks("1", &mut interner)];
        let b = vec![toks("g(2, 3)", &mut interner)];
        let first = expand_arm(&arm, &a, &mut interner).unwrap();
        let second = expand_arm(&arm, &b, &mut interner).unwrap();
        assert_eq!(render_tokens(&first, &interner), "f(1)");
        assert_eq!(render_tokens(&second, &interner), "f(g(2, 3))");
        assert_eq!(arm, before);
    }

    #[test]
    fn test_variadic_splices_in_order() {
        let mut interner = Interner::new();
        let arm = arm(
            &[("fmt", MacroParamKind::Single), ("rest", MacroParamKind::Variadic)],
            "printf($fmt, $rest);",
            &mut interner,
        );
        let args = vec![
            toks("\"%d %d %d\"", &mut interner),
            toks("a", &mut interner),
            toks("b + 1", &mut interner),
            toks("c", &mut interner),
        ];
        let out = expand_arm(&arm, &args, &mut interner).unwrap();
        assert_eq!(render_tokens(&out, &interner), "printf(\"%d %d %d\", a, b + 1, c);");
    }

    #[test]
    fn test_token_pasting() {
        let mut interner = Interner::new();
        let arm = arm(&[("name", MacroParamKind::Single)], "fn get_ ## $name() -> i32 { return 1; }", &mut interner);
        let args = vec![toks("width", &mut interner)];
        let out = expand_arm(&arm, &args, &mut interner).unwrap();
        assert_eq!(render_tokens(&out, &interner), "fn get_width() -> i32 { return 1; }");
    }

    #[test]
    fn test_pasting_requires_identifiers() {
        let mut interner = Interner::new();
        let arm = arm(&[], "a ## (", &mut interner);
        assert!(expand_arm(&arm, &[], &mut interner).is_err());
    }

    #[test]
    fn test_arm_selection() {
        let mut interner = Interner::new();
        let name = interner.get_or_intern("m");
        let mac = Macro {
            name,
            arms: vec![
                arm(&[], "0", &mut interner),
                arm(&[("a", MacroParamKind::Single)], "1", &mut interner),
                arm(&[("a", MacroParamKind::Single), ("b", MacroParamKind::Single)], "2", &mut interner),
                arm(&[("xs", MacroParamKind::Variadic)], "3", &mut interner),
            ],
        };
        let body = |argc| render_tokens(&select_arm(&mac, argc).unwrap().body, &interner);
        assert_eq!(body(0), "0");
        assert_eq!(body(1), "1");
        assert_eq!(body(2), "2");
        assert_eq!(body(5), "3");
    }

    #[test]
    fn test_wrong_argument_count_is_rejected() {
        let mut interner = Interner::new();
        let arm = arm(&[("a", MacroParamKind::Single)], "$a", &mut interner);
        let args = vec![toks("1", &mut interner), toks("2", &mut interner)];
        let err = expand_arm(&arm, &args, &mut interner).unwrap_err();
        assert!(err.contains("takes 1"), "{err}");
    }
}
