//! Tests for the line framer

use super::*;

fn drain(framer: &mut LineFramer) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(line) = framer.next_line() {
        lines.push(line);
    }
    lines
}

#[test]
fn single_line() {
    let mut framer = LineFramer::new();
    framer.feed(b"john\n");
    assert_eq!(drain(&mut framer), vec!["john"]);
    assert_eq!(framer.partial_len(), 0);
}

#[test]
fn line_split_across_chunks() {
    let mut framer = LineFramer::new();

    framer.feed(b"OK\nhel");
    assert_eq!(drain(&mut framer), vec!["OK"]);
    assert_eq!(framer.partial_len(), 3);

    framer.feed(b"lo\n\n");
    assert_eq!(drain(&mut framer), vec!["hello", ""]);
    assert_eq!(framer.partial_len(), 0);
}

#[test]
fn empty_lines_are_preserved() {
    let mut framer = LineFramer::new();
    framer.feed(b"\n\na\n");
    assert_eq!(drain(&mut framer), vec!["", "", "a"]);
}

#[test]
fn byte_at_a_time() {
    let mut framer = LineFramer::new();
    for &b in b"192.168.0.1\nx\n" {
        framer.feed(&[b]);
    }
    assert_eq!(drain(&mut framer), vec!["192.168.0.1", "x"]);
}

#[test]
fn partial_without_newline_stays_buffered() {
    let mut framer = LineFramer::new();
    framer.feed(b"no newline here");
    assert!(framer.is_empty());
    assert_eq!(framer.partial_len(), 15);
    // the partial is surfaced only once terminated
    framer.feed(b" - done\n");
    assert_eq!(drain(&mut framer), vec!["no newline here - done"]);
}

#[test]
fn framing_round_trip() {
    // n newlines in, exactly n lines out, and rejoining them with \n
    // reproduces the consumed input up to the last newline
    let input = b"alpha\n\nbeta.gamma\ndelta-0123\n trailing garbage";
    let newlines = input.iter().filter(|&&b| b == b'\n').count();

    let mut framer = LineFramer::new();
    // feed in awkward chunk sizes to exercise the partial buffer
    for chunk in input.chunks(3) {
        framer.feed(chunk);
    }

    let lines = drain(&mut framer);
    assert_eq!(lines.len(), newlines);

    let mut rejoined = lines.join("\n");
    rejoined.push('\n');
    assert_eq!(rejoined.as_bytes(), &input[..input.len() - 17]);
    assert_eq!(framer.partial_len(), 17);
}
