use crate::compiler::tokens::DisplaySpan;

crate::define_errors! {
    ParseError {
        #[msg = "Unexpected {what}"]
        #[help = "Check the syntax at this location"]
        Unexpected {
            what: String,
            span: DisplaySpan,
        },

        #[msg = "Expected {what}, got {got}"]
        #[help = "The parser expected something different here"]
        Expected {
            what: String,
            got: String,
            span: DisplaySpan,
        },

        #[msg = "Invalid {what}: {reason}"]
        #[help = "This construct is not valid in the current context"]
        Invalid {
            what: String,
            reason: String,
            span: DisplaySpan,
        },
    }
}
