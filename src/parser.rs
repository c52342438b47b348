//! The token-list interface consumed by the job builder.
//!
//! The grammar is deliberately flat: a line is whitespace-delimited
//! tokens, and the reserved markers (`|`, `<`, `>`, `2>`, `&`) are only
//! recognized when they stand alone as tokens.

/// Reserved tokens that terminate a segment's argv.
const ARG_MARKERS: [&str; 4] = ["<", ">", "2>", "&"];

/// Split a raw input line into whitespace-delimited tokens.
pub fn tokenize(input: &str) -> Vec<String> {
    input.split_whitespace().map(str::to_string).collect()
}

/// Split the token list at the first `|`, truncating the head in place.
/// Returns the tokens after the pipe, or `None` when no pipe remains.
pub fn split_pipe(tokens: &mut Vec<String>) -> Option<Vec<String>> {
    let at = tokens.iter().position(|t| t == "|")?;
    let tail = tokens[at + 1..].to_vec();
    tokens.truncate(at);
    Some(tail)
}

fn token_after<'a>(tokens: &'a [String], marker: &str) -> Option<&'a str> {
    let at = tokens.iter().position(|t| t == marker)?;
    tokens.get(at + 1).map(String::as_str)
}

/// Path named by the first `<`, if any.
pub fn redirect_stdin(tokens: &[String]) -> Option<&str> {
    token_after(tokens, "<")
}

/// Path named by the first `>`, if any.
pub fn redirect_stdout(tokens: &[String]) -> Option<&str> {
    token_after(tokens, ">")
}

/// Path named by the first `2>`, if any.
pub fn redirect_stderr(tokens: &[String]) -> Option<&str> {
    token_after(tokens, "2>")
}

/// True when the line ends in a lone `&`. The marker is removed so the
/// displayed command string never carries it.
pub fn take_ampersand(tokens: &mut Vec<String>) -> bool {
    if tokens.last().is_some_and(|t| t == "&") {
        tokens.pop();
        true
    } else {
        false
    }
}

/// Truncate the segment at the first redirection or ampersand marker,
/// leaving only the argv handed to exec.
pub fn clip_args(tokens: &mut Vec<String>) {
    if let Some(at) = tokens
        .iter()
        .position(|t| ARG_MARKERS.contains(&t.as_str()))
    {
        tokens.truncate(at);
    }
}
