use crate::compiler::tokens::{Punctuation, TokenKind};

use super::Lexer;

impl Lexer<'_> {
    pub fn check_punctuation(&mut self) -> bool {
        use Punctuation::*;

        macro_rules! check_punct {
            ($str:expr, $punct:expr) => {{
                let matches = $str.chars().enumerate().all(|(i, expected)| self.peek(i) == Some(expected));
                if matches {
                    let start = self.cursor;
                    for _ in $str.chars() {
                        self.bump();
                    }
                    self.push(TokenKind::Punctuation($punct), start);
                    return true;
                }
            }};
        }

        check_punct!("&&", AmpAmp);
        check_punct!("||", PipePipe);
        check_punct!("!=", NotEq);
        check_punct!("==", EqEq);
        check_punct!("<=", LessThanOrEq);
        check_punct!(">=", GreaterThanOrEq);
        check_punct!("->", Arrow);
        check_punct!("::", ColonColon);
        check_punct!("##", HashHash);

        check_punct!("&", Amp);
        check_punct!("!", Bang);
        check_punct!("*", Star);
        check_punct!("=", Eq);
        check_punct!("<", LessThan);
        check_punct!(">", GreaterThan);
        check_punct!("#", Hash);
        check_punct!("$", Dollar);

        check_punct!(")", CloseParen);
        check_punct!("(", OpenParen);
        check_punct!("{", OpenBrace);
        check_punct!("}", CloseBrace);
        check_punct!("[", OpenBracket);
        check_punct!("]", CloseBracket);
        check_punct!(",", Comma);
        check_punct!(".", Dot);
        check_punct!(":", Colon);
        check_punct!(";", Semicolon);
        check_punct!("/", Slash);
        check_punct!("%", Percent);
        check_punct!("+", Plus);
        check_punct!("-", Minus);

        false
    }
}
