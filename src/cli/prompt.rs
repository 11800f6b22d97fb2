//! Interactive collection of optional run settings.

use std::io::{self, BufRead, Write};

use crate::runner::OptionalSettings;

/// Asks for the optional group tag and timestep skip.
///
/// Empty input and end of input keep the defaults (no tag, no skip).
/// Invalid numbers are asked for again.
pub fn prompt_optional_settings<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> io::Result<OptionalSettings> {
    let group_tag = read_answer(
        input,
        output,
        "Experiment group tag (leave empty for none): ",
    )?
    .filter(|tag| !tag.is_empty());

    let skip_first_n_timesteps = loop {
        let Some(answer) = read_answer(input, output, "Skip first N timesteps [0]: ")? else {
            break None;
        };
        if answer.is_empty() {
            break None;
        }
        match answer.parse::<u32>() {
            Ok(0) => break None,
            Ok(n) => break Some(n),
            Err(_) => writeln!(output, "Please enter a non-negative whole number.")?,
        }
    };

    Ok(OptionalSettings {
        group_tag,
        skip_first_n_timesteps,
    })
}

/// Prompts once; returns `None` at end of input.
fn read_answer<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> io::Result<Option<String>> {
    write!(output, "{}", question)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        writeln!(output)?;
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
