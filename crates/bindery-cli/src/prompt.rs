// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Terminal answers to collision requests.

use std::io::{BufRead, Write};

use bindery_pipeline::{CollisionDecision, ConfirmationRequest};

/// Map one line of user input to a decision.
pub fn parse_answer(line: &str) -> Option<CollisionDecision> {
    match line.trim().to_ascii_lowercase().as_str() {
        "o" | "overwrite" => Some(CollisionDecision::Overwrite),
        "r" | "rename" => Some(CollisionDecision::Rename),
        "a" | "abort" | "s" | "skip" => Some(CollisionDecision::Abort),
        _ => None,
    }
}

/// Ask until a valid answer arrives. End of input aborts the unit.
pub fn ask(request: &ConfirmationRequest, input: &mut impl BufRead, output: &mut impl Write) -> CollisionDecision {
    loop {
        let _ = write!(output, "{}. [o]verwrite / [r]ename / [a]bort? ", request.message);
        let _ = output.flush();
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return CollisionDecision::Abort,
            Ok(_) => {
                if let Some(decision) = parse_answer(&line) {
                    return decision;
                }
            }
        }
    }
}
