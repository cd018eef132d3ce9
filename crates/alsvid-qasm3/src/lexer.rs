//! Lexer for `OpenQASM` 3.
//!
//! Classifies source spans into tokens; numeric payloads are decoded
//! in the logos callbacks but no constant folding happens here.
//! Pragma lines are captured whole (they are terminated by the end of
//! the line, not by a semicolon) and re-tokenized by the parser.

use logos::Logos;

fn parse_radix(slice: &str, radix: u32) -> Option<u64> {
    u64::from_str_radix(&slice[2..], radix).ok()
}

fn parse_imaginary(slice: &str) -> Option<f64> {
    slice.trim_end_matches("im").trim_end().parse::<f64>().ok()
}

/// Tokens for `OpenQASM` 3.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/")]
pub enum Token {
    // Keywords
    #[token("OPENQASM")]
    OpenQasm,

    #[token("include")]
    Include,

    #[token("qubit")]
    Qubit,

    #[token("bit")]
    Bit,

    #[token("int")]
    Int,

    #[token("uint")]
    Uint,

    #[token("float")]
    Float,

    #[token("angle")]
    Angle,

    #[token("complex")]
    Complex,

    #[token("bool")]
    Bool,

    #[token("array")]
    Array,

    #[token("const")]
    Const,

    #[token("input")]
    Input,

    #[token("output")]
    Output,

    #[token("gate")]
    Gate,

    #[token("def")]
    Def,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("for")]
    For,

    #[token("while")]
    While,

    #[token("in")]
    In,

    #[token("switch")]
    Switch,

    #[token("case")]
    Case,

    #[token("default")]
    Default,

    #[token("break")]
    Break,

    #[token("continue")]
    Continue,

    #[token("return")]
    Return,

    #[token("end")]
    End,

    #[token("measure")]
    Measure,

    #[token("box")]
    Box,

    #[token("gphase")]
    GPhase,

    #[token("mutable")]
    Mutable,

    #[token("readonly")]
    Readonly,

    // Gate modifiers
    #[token("ctrl")]
    Ctrl,

    #[token("negctrl")]
    NegCtrl,

    #[token("inv")]
    Inv,

    #[token("pow")]
    Pow,

    // Reserved keywords the front-end rejects
    #[token("reset")]
    Reset,

    #[token("delay")]
    Delay,

    #[token("barrier")]
    Barrier,

    #[token("cal")]
    Cal,

    #[token("defcal")]
    DefCal,

    #[token("duration")]
    Duration,

    #[token("durationof")]
    DurationOf,

    #[token("stretch")]
    Stretch,

    #[token("extern")]
    Extern,

    #[token("let")]
    Let,

    // Irrational constants — single lexemes
    #[token("pi")]
    #[token("π")]
    Pi,

    #[token("tau")]
    #[token("τ")]
    Tau,

    #[token("euler")]
    #[token("ℯ")]
    #[token("ℇ")]
    Euler,

    #[token("true")]
    True,

    #[token("false")]
    False,

    // Directives
    #[regex(r"#pragma[^\n]*", |lex| lex.slice()["#pragma".len()..].trim().to_string())]
    Pragma(String),

    #[token("#dim")]
    Dim,

    // Literals. Imaginary before float so the `im` suffix wins.
    #[regex(r"([0-9]+\.[0-9]*|\.[0-9]+|[0-9]+)([eE][+-]?[0-9]+)?im", |lex| parse_imaginary(lex.slice()), priority = 4)]
    ImaginaryLiteral(f64),

    #[regex(r"([0-9]+\.[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    FloatLiteral(f64),

    #[regex(r"0[xX][0-9a-fA-F]+", |lex| parse_radix(lex.slice(), 16))]
    #[regex(r"0[oO][0-7]+", |lex| parse_radix(lex.slice(), 8))]
    #[regex(r"0[bB][01]+", |lex| parse_radix(lex.slice(), 2))]
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok(), priority = 3)]
    IntLiteral(u64),

    #[regex(r#""[01]+""#, |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].chars().map(|c| c == '1').collect::<Vec<bool>>())
    }, priority = 3)]
    BitstringLiteral(Vec<bool>),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].to_string())
    })]
    StringLiteral(String),

    #[regex(r"\$[0-9]+", |lex| lex.slice()[1..].parse::<u32>().ok())]
    HardwareQubit(u32),

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // Operators and punctuation
    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("**")]
    DoubleStar,

    #[token("==")]
    EqEq,

    #[token("!=")]
    NotEq,

    #[token("<")]
    Lt,

    #[token("<=")]
    LtEq,

    #[token(">")]
    Gt,

    #[token(">=")]
    GtEq,

    #[token("&&")]
    AndAnd,

    #[token("||")]
    OrOr,

    #[token("!")]
    Not,

    #[token("~")]
    Tilde,

    #[token("&")]
    Ampersand,

    #[token("|")]
    Pipe,

    #[token("^")]
    Caret,

    #[token("<<")]
    LShift,

    #[token(">>")]
    RShift,

    #[token("=")]
    Eq,

    #[token("+=")]
    PlusEq,

    #[token("-=")]
    MinusEq,

    #[token("*=")]
    StarEq,

    #[token("/=")]
    SlashEq,

    #[token("^=")]
    CaretEq,

    #[token("&=")]
    AmpersandEq,

    #[token("|=")]
    PipeEq,

    #[token("<<=")]
    LShiftEq,

    #[token(">>=")]
    RShiftEq,

    #[token("->")]
    Arrow,

    #[token("@")]
    At,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,
}

impl Token {
    /// Check whether this token is a reserved keyword the front-end
    /// refuses to elaborate.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Token::Reset
                | Token::Delay
                | Token::Barrier
                | Token::Cal
                | Token::DefCal
                | Token::Duration
                | Token::DurationOf
                | Token::Stretch
                | Token::Extern
                | Token::Let
        )
    }

    /// Check whether this token starts a classical type.
    pub fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            Token::Bit
                | Token::Int
                | Token::Uint
                | Token::Float
                | Token::Angle
                | Token::Complex
                | Token::Bool
                | Token::Array
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::OpenQasm => write!(f, "OPENQASM"),
            Token::Include => write!(f, "include"),
            Token::Qubit => write!(f, "qubit"),
            Token::Bit => write!(f, "bit"),
            Token::Int => write!(f, "int"),
            Token::Uint => write!(f, "uint"),
            Token::Float => write!(f, "float"),
            Token::Angle => write!(f, "angle"),
            Token::Complex => write!(f, "complex"),
            Token::Bool => write!(f, "bool"),
            Token::Array => write!(f, "array"),
            Token::Const => write!(f, "const"),
            Token::Input => write!(f, "input"),
            Token::Output => write!(f, "output"),
            Token::Gate => write!(f, "gate"),
            Token::Def => write!(f, "def"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::For => write!(f, "for"),
            Token::While => write!(f, "while"),
            Token::In => write!(f, "in"),
            Token::Switch => write!(f, "switch"),
            Token::Case => write!(f, "case"),
            Token::Default => write!(f, "default"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::Return => write!(f, "return"),
            Token::End => write!(f, "end"),
            Token::Measure => write!(f, "measure"),
            Token::Box => write!(f, "box"),
            Token::GPhase => write!(f, "gphase"),
            Token::Mutable => write!(f, "mutable"),
            Token::Readonly => write!(f, "readonly"),
            Token::Ctrl => write!(f, "ctrl"),
            Token::NegCtrl => write!(f, "negctrl"),
            Token::Inv => write!(f, "inv"),
            Token::Pow => write!(f, "pow"),
            Token::Reset => write!(f, "reset"),
            Token::Delay => write!(f, "delay"),
            Token::Barrier => write!(f, "barrier"),
            Token::Cal => write!(f, "cal"),
            Token::DefCal => write!(f, "defcal"),
            Token::Duration => write!(f, "duration"),
            Token::DurationOf => write!(f, "durationof"),
            Token::Stretch => write!(f, "stretch"),
            Token::Extern => write!(f, "extern"),
            Token::Let => write!(f, "let"),
            Token::Pi => write!(f, "pi"),
            Token::Tau => write!(f, "tau"),
            Token::Euler => write!(f, "euler"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Pragma(body) => write!(f, "#pragma {body}"),
            Token::Dim => write!(f, "#dim"),
            Token::ImaginaryLiteral(v) => write!(f, "{v}im"),
            Token::FloatLiteral(v) => write!(f, "{v}"),
            Token::IntLiteral(v) => write!(f, "{v}"),
            Token::BitstringLiteral(bits) => {
                write!(f, "\"")?;
                for b in bits {
                    write!(f, "{}", u8::from(*b))?;
                }
                write!(f, "\"")
            }
            Token::StringLiteral(s) => write!(f, "\"{s}\""),
            Token::HardwareQubit(n) => write!(f, "${n}"),
            Token::Identifier(s) => write!(f, "{s}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::DoubleStar => write!(f, "**"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Tilde => write!(f, "~"),
            Token::Ampersand => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Caret => write!(f, "^"),
            Token::LShift => write!(f, "<<"),
            Token::RShift => write!(f, ">>"),
            Token::Eq => write!(f, "="),
            Token::PlusEq => write!(f, "+="),
            Token::MinusEq => write!(f, "-="),
            Token::StarEq => write!(f, "*="),
            Token::SlashEq => write!(f, "/="),
            Token::CaretEq => write!(f, "^="),
            Token::AmpersandEq => write!(f, "&="),
            Token::PipeEq => write!(f, "|="),
            Token::LShiftEq => write!(f, "<<="),
            Token::RShiftEq => write!(f, ">>="),
            Token::Arrow => write!(f, "->"),
            Token::At => write!(f, "@"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
        }
    }
}

/// A token with its span information.
#[derive(Debug, Clone)]
pub struct SpannedToken {
    /// The classified token.
    pub token: Token,
    /// Byte range in the source.
    pub span: std::ops::Range<usize>,
}

/// Tokenize a QASM3 source string.
///
/// Unrecognized bytes surface as `Err` entries carrying the offending
/// span; the parser fails fast on the first one.
pub fn tokenize(source: &str) -> Vec<Result<SpannedToken, (std::ops::Range<usize>, String)>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        if let Ok(token) = result {
            tokens.push(Ok(SpannedToken { token, span }));
        } else {
            let slice = &source[span.clone()];
            tokens.push(Err((span, format!("Invalid token: '{slice}'"))));
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        tokenize(source)
            .into_iter()
            .map(|r| r.expect("unexpected lex error").token)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = lex("OPENQASM 3.0;");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], Token::OpenQasm);
        assert!(matches!(tokens[1], Token::FloatLiteral(v) if (v - 3.0).abs() < 1e-9));
        assert_eq!(tokens[2], Token::Semicolon);
    }

    #[test]
    fn test_numeric_bases() {
        let tokens = lex("0x1f 0o17 0b101 42 4.5 .5 1e3");
        assert_eq!(tokens[0], Token::IntLiteral(31));
        assert_eq!(tokens[1], Token::IntLiteral(15));
        assert_eq!(tokens[2], Token::IntLiteral(5));
        assert_eq!(tokens[3], Token::IntLiteral(42));
        assert!(matches!(tokens[4], Token::FloatLiteral(v) if (v - 4.5).abs() < 1e-9));
        assert!(matches!(tokens[5], Token::FloatLiteral(v) if (v - 0.5).abs() < 1e-9));
        assert!(matches!(tokens[6], Token::FloatLiteral(v) if (v - 1000.0).abs() < 1e-9));
    }

    #[test]
    fn test_imaginary_literal() {
        let tokens = lex("0.70710678im + 2im");
        assert!(matches!(tokens[0], Token::ImaginaryLiteral(v) if (v - 0.70710678).abs() < 1e-9));
        assert_eq!(tokens[1], Token::Plus);
        assert!(matches!(tokens[2], Token::ImaginaryLiteral(v) if (v - 2.0).abs() < 1e-9));
    }

    #[test]
    fn test_irrationals() {
        assert_eq!(lex("pi"), vec![Token::Pi]);
        assert_eq!(lex("π"), vec![Token::Pi]);
        assert_eq!(lex("τ"), vec![Token::Tau]);
        assert_eq!(lex("ℯ"), vec![Token::Euler]);
    }

    #[test]
    fn test_bitstring_vs_string() {
        let tokens = lex(r#""0101" "hello""#);
        assert_eq!(
            tokens[0],
            Token::BitstringLiteral(vec![false, true, false, true])
        );
        assert_eq!(tokens[1], Token::StringLiteral("hello".into()));
    }

    #[test]
    fn test_hardware_qubit() {
        assert_eq!(lex("$3"), vec![Token::HardwareQubit(3)]);
    }

    #[test]
    fn test_maximal_munch() {
        let tokens = lex("a <<= b << c <= d < e ** f *= g");
        assert!(matches!(tokens[0], Token::Identifier(_)));
        assert_eq!(tokens[1], Token::LShiftEq);
        assert_eq!(tokens[3], Token::LShift);
        assert_eq!(tokens[5], Token::LtEq);
        assert_eq!(tokens[7], Token::Lt);
        assert_eq!(tokens[9], Token::DoubleStar);
        assert_eq!(tokens[11], Token::StarEq);
    }

    #[test]
    fn test_pragma_captures_line() {
        let tokens = lex("#pragma braket result state_vector\nqubit q;");
        assert_eq!(
            tokens[0],
            Token::Pragma("braket result state_vector".into())
        );
        assert_eq!(tokens[1], Token::Qubit);
    }

    #[test]
    fn test_modifier_keywords() {
        let tokens = lex("pow(2) @ inv @ ctrl @ negctrl @");
        assert_eq!(tokens[0], Token::Pow);
        assert_eq!(tokens[4], Token::At);
        assert_eq!(tokens[5], Token::Inv);
        assert_eq!(tokens[7], Token::Ctrl);
        assert_eq!(tokens[9], Token::NegCtrl);
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = lex("qubit q; // trailing\n/* block\n comment */ bit c;");
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn test_invalid_byte_reports_offset() {
        let results = tokenize("qubit ?;");
        let err = results
            .into_iter()
            .find_map(Result::err)
            .expect("expected a lex error");
        assert_eq!(err.0.start, 6);
    }
}
