use rand::{Rng, seq::SliceRandom};

use crate::error::GenerationError;

pub const DEFAULT_RECIPIENT: &str = "Client";

const SIGNATURE: &str = "Best regards,\nManny\nAILA Legal Services";

const CLOSING_PHRASES: [&str; 4] = ["thank", "best", "looking forward", "sincerely"];

const BOILERPLATE: [&str; 9] = [
    "licensed",
    "broker",
    "attachment",
    "http",
    "subject:",
    "regards",
    "thank",
    "sincerely",
    "looking forward",
];

/// Finds the signer of an email: the first short, name-like line that directly
/// follows a closing phrase. Falls back to [`DEFAULT_RECIPIENT`].
pub fn extract_recipient_name(document: &str) -> String {
    let lines: Vec<&str> = document.lines().map(str::trim).collect();

    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_closing_line(line))
        .filter_map(|(index, _)| lines.get(index + 1))
        .find(|candidate| is_name_line(candidate))
        .map(|name| name.to_string())
        .unwrap_or_else(|| DEFAULT_RECIPIENT.to_string())
}

fn is_closing_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    CLOSING_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn is_name_line(line: &str) -> bool {
    let length = line.chars().count();
    if !(4..=50).contains(&length) || line.contains('@') || line.contains('(') {
        return false;
    }
    let lower = line.to_lowercase();
    !BOILERPLATE.iter().any(|marker| lower.contains(marker))
}

/// One family of simulated letters: an opening pool and an action-item pool.
pub struct LetterTemplates {
    pub name: &'static str,
    pub openings: &'static [&'static str],
    pub action_items: &'static [&'static str],
}

impl LetterTemplates {
    pub fn compose<R: Rng + ?Sized>(
        &self,
        recipient: &str,
        rng: &mut R,
    ) -> Result<String, GenerationError> {
        let opening = self
            .openings
            .choose(rng)
            .ok_or(GenerationError::EmptyTemplatePool(self.name))?;
        let action_items = self
            .action_items
            .choose(rng)
            .ok_or(GenerationError::EmptyTemplatePool(self.name))?;

        Ok(format!(
            "Dear {recipient},\n\n{opening}\n\n{action_items}\n\n{SIGNATURE}"
        ))
    }
}

pub const DOCUMENT_REQUEST: LetterTemplates = LetterTemplates {
    name: "document_request",
    openings: &[
        "Thank you for reaching out. I have reviewed your message and would be glad to assist you with this matter.",
        "Thank you for contacting AILA Legal Services. I appreciate you providing the details of your situation.",
        "I have received your email and reviewed the information you shared. I am happy to represent you in this transaction.",
        "Thank you for your message. I understand the importance of this matter and will make sure it receives prompt attention.",
        "I appreciate you reaching out regarding this transaction. Your request has been received and I am ready to begin.",
    ],
    action_items: &[
        "To get started, please send me the following documents:\n- A copy of the purchase and sale agreement or signed offer\n- Any disclosures you have received from the other party\n- Your lender's pre-approval or commitment letter\n- Contact details for the other agents involved",
        "So that I can review everything thoroughly, please provide:\n- The current draft of the contract and any addenda\n- The property's title report, if available\n- Any inspection reports you have received\n- A list of the deadlines you have been given",
        "Before our call, please gather and send the following:\n- Government-issued identification for all parties signing\n- The listing agreement or offer paperwork\n- Prior closing documents or the current deed for the property\n- Any correspondence with the other side about terms",
        "To move forward efficiently, I will need:\n- The signed offer and any counteroffers\n- Your mortgage payoff statement or financing documents\n- The condominium or HOA documents, if applicable\n- Your preferred times for a call this week",
    ],
};

pub const NEXT_STEPS: LetterTemplates = LetterTemplates {
    name: "next_steps",
    openings: &[
        "I have looked over the situation you described, and there is a clear path forward that protects your interests.",
        "Thanks for the update. Based on what you have shared, here is how I recommend we approach this.",
        "I understand your concern, and this is a common issue that we can resolve with the right strategy.",
        "After reviewing your message, I want to outline our options so you can make an informed decision.",
        "This is a time-sensitive matter, so I want to lay out the next steps right away.",
    ],
    action_items: &[
        "Here is how I suggest we proceed:\n1. I will review the agreement terms against the current timeline.\n2. We will identify any contingencies or deadlines that need protecting.\n3. I will contact the other party's counsel to address open issues.\n4. We will schedule a short call to confirm the strategy before anything is signed.",
        "Recommended next steps:\n1. Hold off on signing or waiving anything until we speak.\n2. I will draft a written request to the other side documenting the issue.\n3. We will evaluate whether an extension or price adjustment is appropriate.\n4. I will keep you updated as responses come in.",
        "Our strategy going forward:\n1. Confirm every deadline in the purchase agreement in writing.\n2. Negotiate any needed amendments before they become urgent.\n3. Coordinate with the lender, title company, and agents on a single schedule.\n4. Prepare for closing with a final document checklist.",
        "To protect your position:\n1. I will assess the legal risks and how they affect closing.\n2. We will decide together whether to request repairs, credits, or an extension.\n3. I will handle communication with the other party on your behalf.\n4. We will set a follow-up meeting once we have their answer.",
    ],
};
