//! How to book a tutoring session.
//!
//! Booking itself happens on an external form; this module only holds the
//! instructions shown to visitors and the form's address.

/// Heading of the booking instructions.
pub const HEADLINE: &str = "Book Your Tutoring Session";

/// Line shown under the heading.
pub const TAGLINE: &str = "Take the first step towards achieving your academic goals while helping another student achieve theirs.";

/// The booking form.
pub const FORM_URL: &str = "https://docs.google.com/forms/d/e/1FAIpQLScmEU8mzEDRsSIJ4Wk-cUGqWqPjOYRL3ax-KU0CPn3Y7skacQ/viewform";

/// Hourly price of a session.
pub const RATE: &str = "£10 / hour";

/// Where the money goes.
pub const DONATION: &str = "100% of all proceeds are donated.";

/// The booking process, in order.
pub const STEPS: [&str; 4] = [
    "Fill out the booking form with your details, the subject you need help with, and your general availability.",
    "We will review your request and match you with a qualified tutor within 48 hours.",
    "Your tutor will contact you directly via email to schedule your first online session via Zoom.",
    "Enjoy your personalized tutoring session knowing you're making a difference!",
];

/// The booking instructions as Markdown.
pub fn booking_markdown() -> String {
    let mut text = format!("# {HEADLINE}\n\n{TAGLINE}\n\n## How to Book:\n\n");
    for (i, step) in STEPS.iter().enumerate() {
        text.push_str(&format!("{}. {step}\n", i + 1));
    }
    text.push_str(&format!(
        "\n### Booking Form\n\nOur booking form is hosted on Google Forms for simplicity and \
         security. Open it in a new tab: [Open Booking Form]({FORM_URL})\n"
    ));
    text.push_str(&format!("\n**Tutoring Rate: {RATE}**\n\n{DONATION}\n"));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::markdown::{MarkdownOptions, render};

    #[test]
    fn steps_are_numbered_in_order() {
        let text = booking_markdown();
        let first = text.find("1. Fill out").unwrap();
        let last = text.find("4. Enjoy").unwrap();
        assert!(first < last);
        assert!(text.contains(FORM_URL));
    }

    #[test]
    fn renders_with_link_target() {
        let options = MarkdownOptions {
            gfm: true,
            use_color: false,
        };
        let out = render(&booking_markdown(), &options);
        assert!(out.starts_with("# Book Your Tutoring Session"));
        assert!(out.contains("2. We will review your request"));
        assert!(out.contains(&format!("Open Booking Form ({FORM_URL})")));
        assert!(out.contains("### Booking Form"));
        assert!(out.contains("Tutoring Rate: £10 / hour"));
        assert!(out.ends_with(DONATION));
    }

    #[test]
    fn rate_and_donation_follow_the_form() {
        let text = booking_markdown();
        let form = text.find(FORM_URL).unwrap();
        let rate = text.find(RATE).unwrap();
        let donation = text.find(DONATION).unwrap();
        assert!(form < rate && rate < donation);
    }
}
