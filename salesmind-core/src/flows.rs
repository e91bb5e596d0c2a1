// Built-in demo flows. `call1` ends in an escalation, `call2` replays the captured
// knowledge and closes the deal.

use crate::activity::{ActivityCategory as Cat, ActivityTemplate as Activity};
use crate::script::{ConversationScript, ConversationStep as Step, EndKind};

pub const CALL1: &str = "call1";
pub const CALL2: &str = "call2";

pub fn builtin(key: &str) -> Option<ConversationScript> {
    match key {
        CALL1 => Some(call1()),
        CALL2 => Some(call2()),
        _ => None,
    }
}

pub fn builtin_keys() -> &'static [&'static str] {
    &[CALL1, CALL2]
}

pub fn call1() -> ConversationScript {
    let steps = vec![
        Step::new("greeting")
            .with_cue("call1_greeting")
            .agent_says("Hi, this is Alex from SalesMind. Thanks for taking my call. How are you today?")
            .with_activity(Activity::new("📞", "Call initiated", Cat::Info))
            .wait_for_user(["Good, thanks", "I'm busy, make it quick"]),
        Step::new("intro")
            .with_cue("call1_intro")
            .agent_says("Great! I saw you requested a demo of our sales automation platform. What interested you most?")
            .with_activity(Activity::new("❓", "Discovery question", Cat::Info))
            .wait_for_user([
                "We need better sales automation",
                "We're evaluating different platforms",
            ]),
        Step::new("discovery")
            .with_cue("call1_discovery")
            .agent_says("Perfect. Tell me a bit about your current sales workflow.")
            .with_activity(Activity::new("🔍", "Needs analysis", Cat::Info))
            .wait_for_user([
                "We use spreadsheets, it's messy",
                "We have a CRM but don't use it much",
            ]),
        Step::new("feature_pitch")
            .with_cue("call1_feature_pitch")
            .agent_says("Our platform helps teams like yours automate follow-ups, track conversations, and close deals faster. Would you like to see a quick demo?")
            .with_activity(Activity::new("💡", "Value proposition delivered", Cat::Info))
            .wait_for_user(["Sure, but are you HIPAA compliant?", "Yes, show me the demo"]),
        Step::new("handling_hipaa_unknown")
            .with_cue("call1_handling_hipaa_unknown")
            .agent_says("That's a great question about HIPAA compliance. Let me... um... let me check on that for you.")
            .with_activity(
                Activity::new("⚠️", "Objection detected: HIPAA Compliance", Cat::Warning).highlighted(),
            )
            .auto_advance(1_500),
        Step::new("checking")
            .with_cue("call1_checking")
            .agent_says("I'm searching our documentation now...")
            .with_activity(
                Activity::new("🔍", "Searching knowledge base...", Cat::Info).with_confidence(35),
            )
            .auto_advance(2_000),
        Step::new("no_result")
            .with_activity(Activity::new("❌", "No matching pattern found", Cat::Error).highlighted())
            .auto_advance(1_000),
        Step::new("escalate")
            .with_cue("call1_escalate")
            .agent_says("I want to give you accurate information rather than guess. Let me connect you with our compliance specialist who can walk through our certifications in detail. Would that work?")
            .with_activity(
                Activity::new("🚨", "Escalating to human (confidence: 35%)", Cat::Warning).highlighted(),
            )
            .wait_for_user(["Okay, I'll wait for the callback", "Can't you just check now?"]),
        Step::new("closing_failed")
            .with_cue("call1_closing_failed")
            .agent_says("Perfect, they'll reach out within the hour. Thanks for your time!")
            .with_activity(Activity::new("📞", "Call ended - Escalated to human", Cat::Error))
            .end(EndKind::Escalate),
    ];

    ConversationScript::new(CALL1, "Call 1 - Agent Alpha (Learning)", steps)
}

pub fn call2() -> ConversationScript {
    let steps = vec![
        Step::new("greeting")
            .with_cue("call2_greeting")
            .agent_says("Hi, this is Jamie from SalesMind. Is this a good time to chat?")
            .with_activity(Activity::new("📞", "Call initiated", Cat::Info))
            .wait_for_user(["Yes, I have a few minutes", "Make it quick"]),
        Step::new("intro")
            .with_cue("call2_intro")
            .agent_says("Excellent! I understand you're looking at sales automation tools for your team. What's your biggest challenge right now?")
            .with_activity(Activity::new("🔍", "Discovery mode", Cat::Info))
            .wait_for_user([
                "Are you HIPAA compliant? We need BAA agreements",
                "We need better pipeline tracking",
            ]),
        Step::new("searching")
            .with_activity(Activity::new("🔍", "Searching collective knowledge base...", Cat::Info))
            .auto_advance(800),
        Step::new("found_knowledge")
            .with_activity(
                Activity::new("💾", "Retrieved Response #1 (from Agent A-1)", Cat::Success)
                    .with_detail("Added 5 minutes ago | Success Rate: N/A (first use)")
                    .with_confidence(95)
                    .highlighted(),
            )
            .auto_advance(1_000),
        Step::new("handling_hipaa_confident")
            .with_cue("call2_handling_hipaa_confident")
            .agent_says("Absolutely! We're HIPAA compliant with SOC2 Type II certification. We provide Business Associate Agreements as standard, and all data is encrypted at rest and in transit. I can send you our complete security documentation right now. Would you like me to email that over?")
            .with_activity(Activity::new("✅", "Using collective knowledge!", Cat::Success).highlighted())
            .wait_for_user([
                "Perfect, yes please send that",
                "Great, that's exactly what I needed",
            ]),
        Step::new("sentiment_improved")
            .with_activity(Activity::new("😊", "Sentiment improved: 45 → 85", Cat::Success))
            .auto_advance(500),
        Step::new("demo_transition")
            .with_cue("call2_demo_transition")
            .agent_says("Perfect, I just sent that. Now let me show you how our platform specifically helps healthcare and medical device companies close deals faster.")
            .with_activity(Activity::new("🎯", "Demo phase", Cat::Info))
            .auto_advance(1_000),
        Step::new("features")
            .with_cue("call2_features")
            .agent_says("You'll see real-time conversation tracking, automated follow-ups that are HIPAA-compliant, and analytics on your pipeline. Most healthcare clients see a thirty percent increase in close rates within the first quarter.")
            .with_activity(Activity::new("📊", "Delivering value proposition", Cat::Info))
            .wait_for_user(["This sounds great", "Tell me more about pricing"]),
        Step::new("trial_close")
            .with_cue("call2_trial_close")
            .agent_says("Does this sound like something that could help your team?")
            .with_activity(Activity::new("🎯", "Trial close", Cat::Info))
            .wait_for_user(["Yes, this looks perfect for our needs", "I need to think about it"]),
        Step::new("closing_detected")
            .with_activity(
                Activity::new("🎉", "Close detected - Probability: 91%", Cat::Success).highlighted(),
            )
            .auto_advance(800),
        Step::new("closing_won")
            .with_cue("call2_closing_won")
            .agent_says("Fantastic! I'll send over the contract and implementation timeline right now. When would be best to kick off - this week or next?")
            .with_activity(Activity::new("📝", "Contract stage", Cat::Info))
            .wait_for_user(["This week works - Wednesday", "Next week is better"]),
        Step::new("final")
            .with_cue("call2_final")
            .agent_says("Perfect, I'll get everything scheduled. Looking forward to working with you!")
            .with_activity(Activity::new("✅", "Call ended - Closed Won $95K", Cat::Success))
            .end(EndKind::Success),
    ];

    ConversationScript::new(CALL2, "Call 2 - Agent Beta (Using Learned Knowledge)", steps)
}
