//! Contact matching: normalization and the grading heuristic that decides
//! whether an existing CRM contact is the same client as incoming lead data.
//!
//! Scoring: exact name +2 (substring +1), phone match +7, email match +4.
//! A supplied phone or email that matches none of the candidate's values is
//! a veto: the grade becomes exactly -100, it is never summed, and a second
//! veto does not push it lower. Grades only rank candidates within one
//! search; a best grade of zero means no match.

use amocrm_types::{Contact, Lead, MatchResult};

/// Grade assigned when a supplied identifying field fails to match
pub const VETO_GRADE: i32 = -100;

const NAME_EXACT: i32 = 2;
const NAME_SUBSTRING: i32 = 1;
const PHONE_MATCH: i32 = 7;
const EMAIL_MATCH: i32 = 4;

/// Minimum normalized length (in characters) for a substring name match
const NAME_SUBSTRING_MIN_CHARS: usize = 2;

/// Trim control characters and invisible whitespace from both ends and
/// lower-case for comparison
pub fn normalize(s: &str) -> String {
    s.trim_matches(is_junk).to_lowercase()
}

/// Keep ASCII digits only and fold the Russian trunk/country prefix:
/// "+7 (900) 123-45-67", "8 900 123-45-67" and "9001234567" all compare
/// equal
pub fn normalize_phone(s: &str) -> String {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && (digits.starts_with('7') || digits.starts_with('8')) {
        digits[1..].to_string()
    } else {
        digits
    }
}

fn is_junk(c: char) -> bool {
    // ASCII control covers 0x00-0x1F and 0x7F; the rest are NBSP,
    // zero-width space, and BOM that web forms routinely leak
    c.is_ascii_control() || matches!(c, '\u{A0}' | '\u{200B}' | '\u{FEFF}')
}

/// Grade a candidate contact against lead data. Deterministic, and
/// independent of the ordering of the candidate's phones/emails.
pub fn grade(candidate: &Contact, lead: &Lead) -> i32 {
    let mut grade = 0;
    let mut veto = false;

    let lead_name = normalize(&lead.name);
    let cand_name = normalize(&candidate.name);
    if !lead_name.is_empty() && !cand_name.is_empty() {
        if lead_name == cand_name {
            grade += NAME_EXACT;
        } else if lead_name.chars().count() > NAME_SUBSTRING_MIN_CHARS
            && cand_name.chars().count() > NAME_SUBSTRING_MIN_CHARS
            && (cand_name.contains(&lead_name) || lead_name.contains(&cand_name))
        {
            grade += NAME_SUBSTRING;
        }
    }

    let lead_phone = normalize_phone(&lead.phone);
    if !lead_phone.is_empty() {
        if candidate
            .phones
            .iter()
            .any(|p| normalize_phone(p) == lead_phone)
        {
            grade += PHONE_MATCH;
        } else {
            veto = true;
        }
    }

    let lead_email = normalize(&lead.email);
    if !lead_email.is_empty() {
        if candidate.emails.iter().any(|e| normalize(e) == lead_email) {
            grade += EMAIL_MATCH;
        } else {
            veto = true;
        }
    }

    if veto {
        return VETO_GRADE;
    }
    grade
}

/// Pick the best candidate strictly above the zero baseline. An empty list,
/// or a list where nothing grades above zero, yields no match.
pub fn find_best(candidates: Vec<Contact>, lead: &Lead) -> Option<MatchResult> {
    let mut best: Option<MatchResult> = None;
    let mut best_grade = 0;

    for contact in candidates {
        let grade = grade(&contact, lead);
        log::debug!("candidate {} '{}' graded {}", contact.id, contact.name, grade);
        if grade > best_grade {
            best_grade = grade;
            best = Some(MatchResult { contact, grade });
        }
    }

    best
}
