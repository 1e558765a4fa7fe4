use std::io::{BufRead, Write};

use crate::error::Result;

/// Whether `input` is the confirmation token, ignoring case and surrounding whitespace
pub fn is_confirmed(input: &str, token: &str) -> bool {
    let input = input.trim();
    !input.is_empty() && input.to_lowercase() == token.trim().to_lowercase()
}

/// Ask for the confirmation token and read a single line of input
///
/// End of input counts as declining.
pub fn confirm<R, W>(input: &mut R, output: &mut W, prompt: &str, token: &str) -> Result<bool>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    write!(output, "{} Type '{}' to confirm: ", prompt, token)?;
    output.flush()?;

    let mut line = String::new();
    let read = input.read_line(&mut line)?;
    if read == 0 {
        writeln!(output)?;
        return Ok(false);
    }

    Ok(is_confirmed(&line, token))
}
