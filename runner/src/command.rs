use itertools::Itertools;
use std::{
    fmt::{self, Display},
    path::Path,
};

/// Significant digits used when rendering floating point flag values
const FLOAT_PRECISION: usize = 20;

/// Typed value of a flag, rendered according to its kind
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    /// rendered with `FLOAT_PRECISION` significant digits so tuning parameters survive the trip
    Float(f64),
    Text(String),
}

impl Value {
    /// text value wrapped in double quotes, see [`quote`]
    pub fn quoted(value: impl Display) -> Self {
        Self::Text(quote(value))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => f.write_str(&format_float(*value, FLOAT_PRECISION)),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A single element of a command line
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// emitted verbatim, may hold several shell words (e.g. pre-joined option strings)
    Literal(String),
    /// `name` or `name value`
    Flag { name: String, value: Option<Value> },
    /// emitted wrapped in double quotes
    Quoted(String),
}

impl Token {
    pub fn flag(name: impl Into<String>) -> Self {
        Self::Flag {
            name: name.into(),
            value: None,
        }
    }

    pub fn option(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Flag {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn quoted(value: impl Display) -> Self {
        Self::Quoted(value.to_string())
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(literal) => f.write_str(literal),
            Self::Flag { name, value: None } => f.write_str(name),
            Self::Flag {
                name,
                value: Some(value),
            } => write!(f, "{name} {value}"),
            Self::Quoted(value) => f.write_str(&quote(value)),
        }
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_owned())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Wrap a value in double quotes.
///
/// Embedded quote characters are NOT escaped, a value containing `"` produces a broken shell
/// word. Callers decide when a token needs quoting.
pub fn quote(value: impl Display) -> String {
    format!("\"{value}\"")
}

/// Shell suffix sending stderr to `log_path`, empty without one
pub fn stderr_redirection(log_path: Option<&Path>) -> String {
    log_path
        .map(|path| format!(" 2> {}", quote(path.display())))
        .unwrap_or_default()
}

/// Ordered, appendable list of tokens rendering to a single shell command string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandLine {
    tokens: Vec<Token>,
}

impl CommandLine {
    /// start a command line with the program to run
    pub fn new(program: impl Display) -> Self {
        Self {
            tokens: vec![Token::Literal(program.to_string())],
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn append(&mut self, token: impl Into<Token>) -> &mut Self {
        self.tokens.push(token.into());
        self
    }

    /// builder flavoured [`CommandLine::append`]
    pub fn arg(mut self, token: impl Into<Token>) -> Self {
        self.tokens.push(token.into());
        self
    }

    pub fn flag(self, name: impl Into<String>) -> Self {
        self.arg(Token::flag(name))
    }

    pub fn option(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arg(Token::option(name, value))
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// space-joined tokens in append order
    pub fn render(&self) -> String {
        self.tokens.iter().join(" ")
    }
}

impl Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl<T: Into<Token>> Extend<T> for CommandLine {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.tokens.extend(iter.into_iter().map(Into::into));
    }
}

/// `%.<precision>g` style formatting: shortest of fixed/scientific, trailing zeros removed
fn format_float(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }

    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_owned()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn render_keeps_append_order() {
        let mut command = CommandLine::new("thrpe");
        command
            .append(Token::option("--input", "-"))
            .append(Token::option("--output", Value::quoted("out put.gz")))
            .append(Token::flag("--debug"))
            .append("--remove-operation --remove-feature-function");

        assert_eq!(
            command.render(),
            "thrpe --input - --output \"out put.gz\" --debug --remove-operation --remove-feature-function"
        );
    }

    #[test]
    pub fn flag_values_render_by_kind() {
        assert_eq!(Token::option("--threads", 4).to_string(), "--threads 4");
        assert_eq!(Token::option("--debug", -2i64).to_string(), "--debug -2");
        assert_eq!(
            Token::option("--regularize-l2", 0.1).to_string(),
            "--regularize-l2 0.10000000000000000555"
        );
        assert_eq!(Token::option("--scale", 0.5).to_string(), "--scale 0.5");
        assert_eq!(Token::option("--scale", 2.0).to_string(), "--scale 2");
        assert_eq!(Token::option("--scorer", "bleu:order=4").to_string(), "--scorer bleu:order=4");
        assert_eq!(Token::flag("--forest").to_string(), "--forest");
    }

    #[test]
    pub fn float_formatting_switches_to_scientific() {
        assert_eq!(format_float(1e-5, 20), "1.0000000000000000818e-05");
        assert_eq!(format_float(1e21, 20), "1e+21");
        assert_eq!(format_float(0.001, 3), "0.001");
        assert_eq!(format_float(-0.0, 20), "-0");
        assert_eq!(format_float(f64::INFINITY, 20), "inf");
    }

    #[test]
    pub fn quoting_does_not_escape() {
        assert_eq!(quote("a b"), "\"a b\"");
        assert_eq!(Token::quoted("say \"hi\"").to_string(), "\"say \"hi\"\"");
    }

    #[test]
    pub fn empty_command_renders_empty() {
        assert_eq!(CommandLine::empty().render(), "");
        assert!(CommandLine::empty().is_empty());
    }

    #[test]
    pub fn extend_appends_literals() {
        let mut command = CommandLine::new("mpirun");
        command.extend(["-x", "LD_LIBRARY_PATH"]);

        assert_eq!(command.render(), "mpirun -x LD_LIBRARY_PATH");
        assert_eq!(command.tokens().len(), 3);
    }
}
