// src/output/line_protocol.rs
//! InfluxDB line protocol, millisecond precision.

use crate::transform::{FieldValue, Point};

/// Encode one point. Points without fields are not representable and yield `None`.
pub fn encode(point: &Point) -> Option<String> {
    if !point.has_fields() {
        return None;
    }

    let mut line = escape(&point.measurement, &[',', ' ']);
    for (k, v) in &point.tags {
        line.push(',');
        line.push_str(&escape(k, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(v, &[',', '=', ' ']));
    }

    line.push(' ');
    let fields: Vec<String> = point
        .fields
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k, &[',', '=', ' ']), field_value(v)))
        .collect();
    line.push_str(&fields.join(","));

    line.push(' ');
    line.push_str(&point.timestamp.timestamp_millis().to_string());
    Some(line)
}

fn field_value(v: &FieldValue) -> String {
    match v {
        FieldValue::Int(i) => format!("{i}i"),
        FieldValue::Float(x) => format!("{x}"),
        FieldValue::String(s) => format!("\"{}\"", escape(s, &['"', '\\'])),
    }
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        // raw newlines would split the line
        if c == '\n' {
            out.push_str("\\n");
            continue;
        }
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn point() -> Point {
        Point::new("room temp", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn encodes_tags_and_typed_fields() {
        let mut p = point();
        p.set_tag("room id", "A,1".into());
        p.set_field("t", FieldValue::Float(21.5));
        p.set_field("n", FieldValue::Int(3));
        p.set_field("note", FieldValue::String(r#"say "hi""#.into()));
        assert_eq!(
            encode(&p).unwrap(),
            r#"room\ temp,room\ id=A\,1 t=21.5,n=3i,note="say \"hi\"" 1704067200000"#
        );
    }

    #[test]
    fn whole_floats_stay_floats() {
        let mut p = point();
        p.set_field("v", FieldValue::Float(2.0));
        assert!(encode(&p).unwrap().contains(" v=2 "));
    }

    #[test]
    fn point_without_fields_is_skipped() {
        let mut p = point();
        p.set_tag("a", "b".into());
        assert_eq!(encode(&p), None);
    }
}
