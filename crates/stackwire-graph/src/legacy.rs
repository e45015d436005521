//! Migration of `{{resolve:ssm:/path}}` string tokens using `nom`.
//!
//! Older deployment files embed store lookups directly in strings. A string
//! that is exactly one token becomes a [`PropertyValue::Deferred`]; a token
//! embedded in surrounding text becomes a [`PropertyValue::Sub`] whose
//! variables are deferred references. Strings without tokens are returned
//! unchanged.

use std::collections::BTreeMap;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_until, take_until1},
    combinator::{cut, rest, verify},
    sequence::{preceded, terminated},
};
use stackwire_common::constants::{LEGACY_TOKEN_CLOSE, LEGACY_TOKEN_OPEN};
use stackwire_common::error::{Result, StackwireError};
use stackwire_common::types::{DeferredReference, ParameterKey};

use crate::descriptor::ResourceDescriptor;
use crate::value::PropertyValue;

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Token(&'a str),
}

/// Parses `{{resolve:ssm:PATH}}`. Once the opening tag matched, a missing
/// closing tag is a hard failure rather than a literal.
fn token(input: &str) -> IResult<&str, Segment<'_>> {
    let (input, path) = preceded(
        tag(LEGACY_TOKEN_OPEN),
        cut(terminated(take_until(LEGACY_TOKEN_CLOSE), tag(LEGACY_TOKEN_CLOSE))),
    )
    .parse(input)?;
    Ok((input, Segment::Token(path)))
}

/// Parses text up to the next token, or to the end of input.
fn literal(input: &str) -> IResult<&str, Segment<'_>> {
    let (input, text) = alt((
        take_until1(LEGACY_TOKEN_OPEN),
        verify(rest, |s: &str| !s.is_empty()),
    ))
    .parse(input)?;
    Ok((input, Segment::Literal(text)))
}

fn segments(input: &str) -> Result<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    let mut remaining = input;
    while !remaining.is_empty() {
        let parsed = if remaining.starts_with(LEGACY_TOKEN_OPEN) {
            token(remaining)
        } else {
            literal(remaining)
        };
        let (rest, segment) = parsed.map_err(|e| StackwireError::Config {
            message: format!("unterminated resolve token in \"{input}\" ({e})"),
        })?;
        out.push(segment);
        remaining = rest;
    }
    Ok(out)
}

/// Returns `true` if `input` contains at least one resolve token.
#[must_use]
pub fn has_tokens(input: &str) -> bool {
    input.contains(LEGACY_TOKEN_OPEN)
}

/// Converts one string into an explicit property value.
///
/// # Errors
///
/// Returns [`StackwireError::Config`] for an unterminated token and
/// [`StackwireError::InvalidKey`] if a token's path is not a valid key.
pub fn migrate_string(input: &str) -> Result<PropertyValue> {
    if !has_tokens(input) {
        return Ok(PropertyValue::from(input));
    }
    let segments = segments(input)?;
    if let [Segment::Token(path)] = segments.as_slice() {
        return deferred(path);
    }

    let mut template = String::with_capacity(input.len());
    let mut vars: BTreeMap<String, PropertyValue> = BTreeMap::new();
    let mut names: BTreeMap<&str, String> = BTreeMap::new();
    for segment in &segments {
        match segment {
            Segment::Literal(text) => template.push_str(&text.replace("${", "${!")),
            Segment::Token(path) => {
                let name = match names.get(path) {
                    Some(name) => name.clone(),
                    None => {
                        let name = variable_name(path, &vars);
                        let _ = vars.insert(name.clone(), deferred(path)?);
                        let _ = names.insert(*path, name.clone());
                        name
                    }
                };
                template.push_str("${");
                template.push_str(&name);
                template.push('}');
            }
        }
    }
    Ok(PropertyValue::Sub { template, vars })
}

fn deferred(path: &str) -> Result<PropertyValue> {
    Ok(PropertyValue::Deferred(DeferredReference::string(
        ParameterKey::parse(path)?,
    )))
}

/// `/stocks/api/id` becomes `StocksApiId`; clashes get a numeric suffix.
fn variable_name(path: &str, taken: &BTreeMap<String, PropertyValue>) -> String {
    let mut base = String::new();
    for word in path.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            base.push(first.to_ascii_uppercase());
            base.extend(chars);
        }
    }
    if base.is_empty() {
        base.push_str("Param");
    }
    let mut name = base.clone();
    let mut n = 2;
    while taken.contains_key(&name) {
        name = format!("{base}{n}");
        n += 1;
    }
    name
}

/// Migrates every string nested in `value`.
///
/// `Sub` templates are left alone; their variables are migrated.
///
/// # Errors
///
/// Propagates the first error from [`migrate_string`].
pub fn migrate_value(value: &PropertyValue) -> Result<PropertyValue> {
    match value {
        PropertyValue::String(s) => migrate_string(s),
        PropertyValue::List(items) => items
            .iter()
            .map(migrate_value)
            .collect::<Result<Vec<_>>>()
            .map(PropertyValue::List),
        PropertyValue::Map(entries) => migrate_entries(entries).map(PropertyValue::Map),
        PropertyValue::Sub { template, vars } => Ok(PropertyValue::Sub {
            template: template.clone(),
            vars: migrate_entries(vars)?,
        }),
        other => Ok(other.clone()),
    }
}

fn migrate_entries(
    entries: &BTreeMap<String, PropertyValue>,
) -> Result<BTreeMap<String, PropertyValue>> {
    entries
        .iter()
        .map(|(k, v)| -> Result<(String, PropertyValue)> { Ok((k.clone(), migrate_value(v)?)) })
        .collect()
}

/// Returns a copy of `descriptor` with every property migrated.
///
/// # Errors
///
/// Propagates the first error from [`migrate_string`].
pub fn migrate_descriptor(descriptor: &ResourceDescriptor) -> Result<ResourceDescriptor> {
    let properties = migrate_entries(descriptor.properties())?;
    if &properties != descriptor.properties() {
        tracing::debug!(id = %descriptor.logical_id(), "migrated legacy resolve tokens");
    }
    Ok(descriptor.with_properties(properties))
}
