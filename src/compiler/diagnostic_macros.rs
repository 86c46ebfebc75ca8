/// # Syntax
/// ```ignore
/// define_errors! {
///     ErrorType {
///         #[msg = "Error message with {field} interpolation"]
///         #[help = "Optional help text"]
///         VariantName {
///             field1: Type1,
///             span: DisplaySpan,  // required for all variants
///         },
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_errors {
    (
        $error_name:ident {
            $(
                #[msg = $msg:expr]
                $(#[help = $help:expr])?
                $variant:ident {
                    $($field:ident: $field_ty:ty),* $(,)?
                }
            ),* $(,)?
        }
    ) => {
        #[derive(Debug, Clone)]
        pub enum $error_name {
            $(
                $variant {
                    $($field: $field_ty),*
                }
            ),*
        }

        impl $error_name {
            pub fn span(&self) -> &$crate::compiler::tokens::DisplaySpan {
                match self {
                    $(
                        Self::$variant { span, .. } => span,
                    )*
                }
            }

            #[allow(unused_variables)]
            pub fn help(&self) -> Option<&'static str> {
                match self {
                    $(
                        Self::$variant { .. } => {
                            let help: Option<&'static str> = None;
                            $(
                                let help = Some($help);
                            )?
                            help
                        }
                    )*
                }
            }
        }

        impl std::fmt::Display for $error_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        Self::$variant { $($field),* } => {
                            let mut result = $msg.to_string();
                            $(
                                result = result.replace(
                                    &format!("{{{}}}", stringify!($field)),
                                    &format!("{}", $field)
                                );
                            )*
                            write!(f, "{}", result)
                        }
                    )*
                }
            }
        }

        impl std::error::Error for $error_name {}
    };
}
