/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Canonicalization for recurrence-rule text fields.
//!
//! Peers may emit the clauses of an RRULE (or the dates of an RDATE) in
//! any order, and a byte-comparing sync layer would see every reordering
//! as a change. The converters built here sort the clause list so equal
//! rules encode equally: `rrule`/`exrule` values sort their
//! `;`-separated clauses, `rdate`/`exdate` values sort their
//! `,`-separated dates while leaving the `:`-terminated prefix (e.g.
//! `VALUE=DATE:`) in place.

use eimsync::{Result, Value};

/// A text converter that sorts `separator`-joined parts. With `header`
/// set, everything up to and including the *last* occurrence of that
/// character is preserved untouched and only the tail is sorted.
pub fn separator_sort(
    separator: char,
    header: Option<char>,
) -> impl Fn(Value) -> Result<Value> + Send + Sync + 'static {
    let joiner = separator.to_string();
    move |value| match value {
        Value::Text(s) => {
            let (prefix, tail) = match header.and_then(|h| s.rfind(h)) {
                Some(pos) => (&s[..=pos], &s[pos + 1..]),
                None => ("", s.as_str()),
            };
            let mut parts: Vec<&str> = tail.split(separator).collect();
            parts.sort_unstable();
            Ok(Value::Text(format!("{prefix}{}", parts.join(&joiner))))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn run(converter: impl Fn(Value) -> Result<Value>, input: &str) -> String {
        match converter(Value::text(input)).unwrap() {
            Value::Text(s) => s,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn rrule_clauses_sort() {
        let convert = separator_sort(';', None);
        assert_eq!(
            run(&convert, "FREQ=WEEKLY;BYDAY=TU;COUNT=10"),
            "BYDAY=TU;COUNT=10;FREQ=WEEKLY"
        );
        // Already-sorted input is a fixed point.
        assert_eq!(
            run(&convert, "BYDAY=TU;COUNT=10;FREQ=WEEKLY"),
            "BYDAY=TU;COUNT=10;FREQ=WEEKLY"
        );
    }

    #[test]
    fn rdate_values_sort_behind_the_header() {
        let convert = separator_sort(',', Some(':'));
        assert_eq!(
            run(&convert, "VALUE=DATE:20080201,20080101"),
            "VALUE=DATE:20080101,20080201"
        );
        // No header present: the whole value is a date list.
        assert_eq!(run(&convert, "20080201,20080101"), "20080101,20080201");
    }

    #[test]
    fn sentinels_pass_through() {
        let convert = separator_sort(';', None);
        assert_eq!(convert(Value::NoChange).unwrap(), Value::NoChange);
    }
}
