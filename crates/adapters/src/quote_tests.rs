// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    plain        = { "input.inp", "input.inp" },
    path         = { "/scratch/alice/run-1", "/scratch/alice/run-1" },
    empty        = { "", "''" },
    space        = { "two words", "'two words'" },
    dollar       = { "$HOME", "'$HOME'" },
    semicolon    = { "a;rm", "'a;rm'" },
    single_quote = { "it's", r"'it'\''s'" },
    glob         = { "*.log", "'*.log'" },
)]
fn quotes(input: &str, expected: &str) {
    assert_eq!(quote_arg(input), expected);
}

#[test]
fn command_line_joins_quoted_parts() {
    let args = vec!["-n".to_string(), "a b".to_string()];
    assert_eq!(command_line("mpirun", &args), "mpirun -n 'a b'");
}
