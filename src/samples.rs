//! Built-in client emails for trying comparisons without a document at hand.

/// One canned inbound email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEmail {
    pub id: u32,
    pub subject: &'static str,
    pub content: &'static str,
    pub category: &'static str,
}

impl SampleEmail {
    /// Subject line prepended to the body, the form graders see.
    pub fn document(&self) -> String {
        format!("Subject: {}\n\n{}", self.subject, self.content)
    }
}

pub fn find(id: u32) -> Option<&'static SampleEmail> {
    SAMPLES.iter().find(|sample| sample.id == id)
}

pub static SAMPLES: &[SampleEmail] = &[
    SampleEmail {
        id: 1,
        subject: "Need Legal Assistance for Property Purchase",
        content: r#"Hi Manny,
I'm in the process of making an offer on a condo located at 45 Beacon Street, Unit 3B, Boston, MA 02108. I'd like to have you represent me to review the purchase contract, ensure all terms are in my best interest, and guide me through the closing process.
Please let me know what information or documents you need from me to get started, as well as your availability for a quick call this week.
Thank you,
Rebecca Collins
(617) 555-8241
rebecca.collins@example.com"#,
        category: "Buyer Inquiry – Making an Offer",
    },
    SampleEmail {
        id: 2,
        subject: "Assistance with Selling My House",
        content: r#"Hi Manny,
I'm preparing to sell my house at 128 Elmwood Avenue, Cambridge, MA 02140. I'd like your assistance in reviewing the listing agreement, negotiating terms with the buyer, and handling all closing documents to make sure the transaction is smooth and compliant.
Please let me know your process, fees, and any initial information you need from me to proceed.
Looking forward to hearing from you,
Daniel Foster
(781) 555-9137
daniel.foster@example.com"#,
        category: "Seller Inquiry – Preparing to List",
    },
    SampleEmail {
        id: 3,
        subject: "Purchase Offer for 72 Seaview Avenue, Marblehead, MA 01945 – Attached",
        content: r#"Hi Manny,
I'm representing my client, Sarah Mitchell, in the purchase of 72 Seaview Avenue, Marblehead, MA 01945, and I've attached her signed offer for your review. Please confirm receipt and let me know if there are any issues or missing documents before we proceed.
My client is eager to move forward quickly, so your prompt feedback would be appreciated.
Thank you,
Marion Blake
Licensed Real Estate Broker
(978) 555-4729
marion.blake@example.com
[Attachment: Offer.pdf] https://drive.google.com/file/d/1mAE71KMOUqfFKXGDzkSFqbEeKPkhj-y6/view?usp=sharing"#,
        category: "Broker Submission – Offer Attached",
    },
    SampleEmail {
        id: 4,
        subject: "Questions About Home Inspection Report – 45 Beacon Street, Boston",
        content: r#"Hi Manny,
I just received the inspection report for the condo at 45 Beacon Street, Unit 3B, and there are a few issues noted with the electrical system and roof. Could you review the report and let me know if these warrant requesting repairs or a price adjustment from the seller?
Thanks,
Laura Hernandez
(617) 555-3094
laura.hernandez@example.com"#,
        category: "Buyer – Inspection Contingency Questions",
    },
    SampleEmail {
        id: 5,
        subject: "Advice Needed on Competing Offers – 128 Elmwood Avenue, Cambridge",
        content: r#"Hi Manny,
We've received two offers on our property, one with a higher price but more contingencies, and another with a lower price but all cash and no financing contingency. Could you help me weigh the pros and cons before I make a decision?
Best,
Michael Russo
(781) 555-6218
michael.russo@example.com"#,
        category: "Seller – Multiple Offer Situation",
    },
    SampleEmail {
        id: 6,
        subject: "Title Issue Found – 72 Seaview Avenue, Marblehead",
        content: r#"Hi Manny,
The title company mentioned there's an old lien on the property from a contractor in 2015. Can you explain how this might impact the closing and whether the seller is responsible for clearing it before we move forward?
Thank you,
David Kim
(978) 555-8473
david.kim@example.com"#,
        category: "Buyer – Title Search Concern",
    },
    SampleEmail {
        id: 7,
        subject: "Closing Docs Needed – 19 Willow Lane, Lexington, MA 02420",
        content: r#"Hi Manny,
We're scheduled to close on 19 Willow Lane, Lexington, MA 02420 this Friday, and the lender is requesting the final closing disclosure and deed draft today to stay on track. Could you confirm when these will be ready so I can coordinate with all parties?
Thanks,
Marion Blake
Licensed Real Estate Broker
(978) 555-4729
marion.blake@example.com"#,
        category: "Broker – Urgent Closing Document Request",
    },
    SampleEmail {
        id: 8,
        subject: "Walkthrough Problem – 72 Seaview Avenue, Marblehead",
        content: r#"Hi Manny,
During the final walkthrough today, we noticed that the seller removed the dining room chandelier, which was supposed to be included per the purchase agreement. How should we address this before closing tomorrow?
Best,
Sarah Mitchell
(978) 555-2214
sarah.mitchell@example.com"#,
        category: "Buyer – Final Walkthrough Issue",
    },
    SampleEmail {
        id: 9,
        subject: "Financing Contingency Deadline – 19 Willow Lane, Lexington, MA",
        content: r#"Hi Manny,
My lender just informed me that final underwriting on my mortgage for 19 Willow Lane, Lexington, MA 02420 may take an extra week. The financing contingency deadline in the purchase agreement is coming up in three days.
Can you advise on whether we should request an extension now, and what happens if the loan isn't fully approved by the contingency date?
Thank you,
Ethan Wallace
(617) 555-7625
ethan.wallace@example.com"#,
        category: "Buyer – Financing Contingency Question",
    },
];
