//! Decoding of the numeric cells of paradigm tables.
//!
//! A cell is either empty, `NaN` (both meaning "absent"), a decimal number,
//! or a fraction such as `1/3`, which lets users write "a third of a minute"
//! without rounding.

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, space0},
    combinator::{all_consuming, map, map_res},
    error::Error,
    number::complete::double,
    sequence::{delimited, separated_pair},
    Finish, IResult,
};

fn parse_absent(s: &str) -> IResult<&str, Option<f64>> {
    map(tag_no_case("nan"), |_| None)(s)
}

fn parse_fraction(s: &str) -> IResult<&str, Option<f64>> {
    map_res(
        separated_pair(double, delimited(space0, char('/'), space0), double),
        |(num, denom)| {
            if denom == 0.0 {
                Err("zero denominator")
            } else {
                Ok(Some(num / denom))
            }
        },
    )(s)
}

fn parse_number(s: &str) -> IResult<&str, Option<f64>> {
    map(double, Some)(s)
}

fn parse_cell(s: &str) -> IResult<&str, Option<f64>> {
    all_consuming(alt((parse_absent, parse_fraction, parse_number)))(s)
}

/// Decode one cell. `Ok(None)` means the cell is empty or `NaN`.
pub fn decode_cell(s: &str) -> Result<Option<f64>, Error<String>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match parse_cell(trimmed).finish() {
        Ok((_remaining, value)) => Ok(value.filter(|v| v.is_finite())),
        Err(Error { input, code }) => Err(Error {
            input: input.to_string(),
            code,
        }),
    }
}
