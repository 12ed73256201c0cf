//! Kinds of tokens and syntax-tree nodes produced by the lexer and parser.
//!
//! This is the single source of truth `rowan` uses to tell tokens and nodes
//! apart; both live in the same `u16` space (see [`crate::language`]).

#![allow(bad_style)]

/// Every terminal and non-terminal the grammar can produce.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(u16)]
pub enum SyntaxKind {
    #[doc(hidden)]
    TOMBSTONE,
    #[doc(hidden)]
    EOF,

    // punctuation
    DOT,
    PLUS,
    MINUS,
    STAR,
    SLASH,
    PERCENT_SIGN,
    AMP,
    PIPE,
    EQ,
    NEQ,
    LT,
    GT,
    LE,
    GE,
    EQUIV,
    NEQUIV,
    L_PAREN,
    R_PAREN,
    L_BRACE,
    R_BRACE,
    L_BRACK,
    R_BRACK,
    COMMA,
    AT,
    BACKTICK,

    // word operators (case sensitive, reserved only in operator position)
    and_KW,
    or_KW,
    xor_KW,
    implies_KW,
    div_KW,
    mod_KW,
    in_KW,
    contains_KW,
    is_KW,
    as_KW,
    true_KW,
    false_KW,

    // UCUM calendar-duration units, bare-word form (`4 days`)
    year_KW,
    years_KW,
    month_KW,
    months_KW,
    week_KW,
    weeks_KW,
    day_KW,
    days_KW,
    hour_KW,
    hours_KW,
    minute_KW,
    minutes_KW,
    second_KW,
    seconds_KW,
    millisecond_KW,
    milliseconds_KW,

    // literals
    IDENT,
    DELIMITED_IDENT,
    INT_NUMBER,
    DEC_NUMBER,
    STRING,
    DATE_LITERAL,
    DATETIME_LITERAL,
    TIME_LITERAL,
    EXTERNAL_CONSTANT,
    SPECIAL_VARIABLE,

    // trivia
    WHITESPACE,
    COMMENT,

    // error
    ERROR_TOKEN,

    // nodes
    SOURCE_FILE,
    LITERAL_EXPR,
    QUANTITY_LITERAL,
    NAME_REF,
    IDENTIFIER_EXPR,
    EXTERNAL_CONSTANT_EXPR,
    SPECIAL_VARIABLE_EXPR,
    PAREN_EXPR,
    COLLECTION_LITERAL,
    INVOCATION_EXPR,
    INDEX_EXPR,
    FUNCTION_CALL_EXPR,
    ARG_LIST,
    POLARITY_EXPR,
    MULTIPLICATIVE_EXPR,
    ADDITIVE_EXPR,
    TYPE_EXPR,
    UNION_EXPR,
    INEQUALITY_EXPR,
    EQUALITY_EXPR,
    MEMBERSHIP_EXPR,
    AND_EXPR,
    OR_EXPR,
    XOR_EXPR,
    IMPLIES_EXPR,
    TYPE_SPECIFIER,
    ERROR_NODE,
    INCOMPLETE_NODE,

    #[doc(hidden)]
    __LAST,
}

use SyntaxKind::*;

impl SyntaxKind {
    /// Is this a trivia kind (whitespace or comment), kept on the hidden channel by default.
    pub fn is_trivia(self) -> bool {
        matches!(self, WHITESPACE | COMMENT)
    }

    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            and_KW
                | or_KW
                | xor_KW
                | implies_KW
                | div_KW
                | mod_KW
                | in_KW
                | contains_KW
                | is_KW
                | as_KW
                | true_KW
                | false_KW
                | year_KW
                | years_KW
                | month_KW
                | months_KW
                | week_KW
                | weeks_KW
                | day_KW
                | days_KW
                | hour_KW
                | hours_KW
                | minute_KW
                | minutes_KW
                | second_KW
                | seconds_KW
                | millisecond_KW
                | milliseconds_KW
        )
    }

    /// Look up a bare-word keyword, including calendar-duration unit words.
    pub fn from_keyword(ident: &str) -> Option<SyntaxKind> {
        let kw = match ident {
            "and" => and_KW,
            "or" => or_KW,
            "xor" => xor_KW,
            "implies" => implies_KW,
            "div" => div_KW,
            "mod" => mod_KW,
            "in" => in_KW,
            "contains" => contains_KW,
            "is" => is_KW,
            "as" => as_KW,
            "true" => true_KW,
            "false" => false_KW,
            "year" => year_KW,
            "years" => years_KW,
            "month" => month_KW,
            "months" => months_KW,
            "week" => week_KW,
            "weeks" => weeks_KW,
            "day" => day_KW,
            "days" => days_KW,
            "hour" => hour_KW,
            "hours" => hours_KW,
            "minute" => minute_KW,
            "minutes" => minutes_KW,
            "second" => second_KW,
            "seconds" => seconds_KW,
            "millisecond" => millisecond_KW,
            "milliseconds" => milliseconds_KW,
            _ => return None,
        };
        Some(kw)
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> Self {
        Self(kind as u16)
    }
}

/// Token-literal shorthand, mirroring the token macro convention `rust-analyzer`
/// uses to spell out punctuation and keywords in grammar code.
#[macro_export]
macro_rules! T {
    [.] => { $crate::SyntaxKind::DOT };
    [+] => { $crate::SyntaxKind::PLUS };
    [-] => { $crate::SyntaxKind::MINUS };
    [*] => { $crate::SyntaxKind::STAR };
    [/] => { $crate::SyntaxKind::SLASH };
    [%] => { $crate::SyntaxKind::PERCENT_SIGN };
    [&] => { $crate::SyntaxKind::AMP };
    [|] => { $crate::SyntaxKind::PIPE };
    [=] => { $crate::SyntaxKind::EQ };
    [!=] => { $crate::SyntaxKind::NEQ };
    [<] => { $crate::SyntaxKind::LT };
    [>] => { $crate::SyntaxKind::GT };
    [<=] => { $crate::SyntaxKind::LE };
    [>=] => { $crate::SyntaxKind::GE };
    [~] => { $crate::SyntaxKind::EQUIV };
    [!~] => { $crate::SyntaxKind::NEQUIV };
    ['('] => { $crate::SyntaxKind::L_PAREN };
    [')'] => { $crate::SyntaxKind::R_PAREN };
    ['{'] => { $crate::SyntaxKind::L_BRACE };
    ['}'] => { $crate::SyntaxKind::R_BRACE };
    ['['] => { $crate::SyntaxKind::L_BRACK };
    [']'] => { $crate::SyntaxKind::R_BRACK };
    [,] => { $crate::SyntaxKind::COMMA };
    [@] => { $crate::SyntaxKind::AT };
    [and] => { $crate::SyntaxKind::and_KW };
    [or] => { $crate::SyntaxKind::or_KW };
    [xor] => { $crate::SyntaxKind::xor_KW };
    [implies] => { $crate::SyntaxKind::implies_KW };
    [div] => { $crate::SyntaxKind::div_KW };
    [mod] => { $crate::SyntaxKind::mod_KW };
    [in] => { $crate::SyntaxKind::in_KW };
    [contains] => { $crate::SyntaxKind::contains_KW };
    [is] => { $crate::SyntaxKind::is_KW };
    [as] => { $crate::SyntaxKind::as_KW };
    [true] => { $crate::SyntaxKind::true_KW };
    [false] => { $crate::SyntaxKind::false_KW };
}
