//! Templated fallback replies
//!
//! Used when no conversational responder is configured or it fails. Intent
//! routing is keyword based and checked in a fixed order; the first match
//! wins.

use super::ChatContext;
use crate::config::defaults;

/// Acknowledgement returned when the operator arms the override.
pub const OVERRIDE_ACK: &str = "⚠️ Override acknowledged. I've flagged the DRL decision for manual reversal. \
On the next orchestration cycle, the policy will be flipped — if it was vetoing, it'll approve, and vice versa.\n\n\
This is your call as the operator. The system trusts your judgment, but I'll log this as a Human-in-the-Loop \
intervention for audit purposes.";

/// Reply when there is no halt snapshot, no live tick and no decision yet.
pub const NO_DATA_REPLY: &str = "I don't have any engine data yet — hit the Orchestrate button first \
so I can pull telemetry and give you a proper assessment.";

const HELP_REPLY: &str = "I'm GANTRY — your industrial AI supervisor. Here's what I can help with:\n\n\
• \"How's the engine?\" — Full status report with my assessment\n\
• \"Why this decision?\" — I'll explain the DRL's reasoning step by step\n\
• \"Cost analysis\" — Breakdown of savings and spending logic\n\
• \"Shadow model\" — Compare rule-based vs. neural network decisions\n\
• \"Crew status\" — Technician availability and shift timing\n\
• \"Override\" — Manually reverse the DRL decision (Human-in-the-Loop)\n\n\
Just ask naturally — I understand conversational questions too.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Downtime,
    Status,
    Cost,
    Shadow,
    Crew,
    Explain,
    Help,
    Risk,
    General,
}

const ROUTES: &[(Intent, &[&str])] = &[
    (Intent::Downtime, &["downtime", "how long", "offline", "halted", "stopped", "outage"]),
    (Intent::Status, &["state", "status", "health", "how", "what's going on", "report"]),
    (Intent::Cost, &["cost", "save", "money", "budget", "expense", "worth"]),
    (Intent::Shadow, &["shadow", "conflict", "model", "compare", "disagree", "why different"]),
    (Intent::Crew, &["tech", "person", "shift", "crew", "worker", "available"]),
    (Intent::Explain, &["explain", "why", "reason", "logic", "decision", "how did"]),
    (Intent::Help, &["help", "what can", "command", "options"]),
    (Intent::Risk, &["danger", "risk", "safe", "alarm", "urgent", "emergency"]),
];

pub fn classify(message: &str) -> Intent {
    let msg = message.to_lowercase();
    ROUTES
        .iter()
        .find(|(_, words)| words.iter().any(|w| msg.contains(w)))
        .map_or(Intent::General, |(intent, _)| *intent)
}

/// Render the fallback reply for `message` against `ctx`.
pub fn fallback_reply(message: &str, ctx: &ChatContext) -> String {
    let rul = ctx.rul.unwrap_or(defaults::HEALTHY_PLACEHOLDER_RUL);
    let vib = ctx.vibration.unwrap_or(0.0);
    let eid = ctx.unit_id.as_str();
    let shift_h = ctx.shift_hours;
    let action = spoken(&ctx.action_label);
    let approving = ctx.action_label.contains("APPROVE");

    match classify(message) {
        Intent::Downtime => downtime_reply(ctx),
        Intent::Status if rul < 3.0 => format!(
            "Alright, here's the situation — {eid} is in CRITICAL condition right now. \
We're looking at only {rul:.0} cycles of useful life left, and vibration is sitting at {vib:.4} g RMS. \
That's not a number I'm comfortable with.\n\n\
The DRL policy has decided to {action} — {}\n\n\
Technician is {} with {shift_h:.1}h remaining. I'd keep a close eye on this one.",
            if approving {
                "and honestly, given the urgency, I agree we need that part fast."
            } else {
                "it calculated that rushing the part wont help because the shift timing doesnt line up."
            },
            if ctx.technician_available { "on the floor and ready" } else { "off shift" }
        ),
        Intent::Status if rul < 20.0 => format!(
            "{eid} needs attention. Status is {} — we've got {rul:.0} cycles of runway left and vibration at {vib:.4} g. \
Not dire, but trending the wrong way.\n\n\
Our DRL model is recommending {action}. The logic factors in the tech's remaining shift ({shift_h:.1}h) and whether \
express-shipping actually saves us money or just burns $350 for nothing.\n\n\
Bottom line: monitor closely, and if vibration ticks up, we should re-run orchestration.",
            ctx.status
        ),
        Intent::Status => format!(
            "Good news — {eid} is looking healthy. RUL is at {rul:.0} cycles, vibration is a comfortable {vib:.4} g, \
and there's no urgency.\n\n\
DRL says {action} — which makes sense at this stage. No need to spend $350 on express shipping when the engine \
isn't under stress.\n\n\
Tech is {} with {shift_h:.1}h left. I'll let you know if anything changes.",
            if ctx.technician_available { "available" } else { "off shift" }
        ),
        Intent::Cost if ctx.cost_saved > 0.0 => format!(
            "The DRL model just saved us ${:.0} by vetoing express shipping for {eid}. Here's the breakdown:\n\n\
• Express part cost: $350\n\
• The model determined that the remaining useful life ({rul:.0} cycles) and the tech's shift window ({shift_h:.1}h) \
didn't justify the rush.\n\n\
Think of it this way — if we approved express shipping every time the simple rule flagged an engine, we'd be \
hemorrhaging money on parts that arrive before the technician can even install them. That's exactly what the DRL prevents.",
            ctx.cost_saved
        ),
        Intent::Cost => format!(
            "No savings this cycle — the DRL approved express shipping for {eid} because the situation genuinely calls for it. \
RUL is at {rul:.0} and the technician is {}.\n\n\
Not every decision is about saving money. Sometimes the right call is spending $350 now to prevent a $50,000 \
unplanned outage tomorrow.",
            if ctx.technician_available { "ready to install" } else { "about to come on shift" }
        ),
        Intent::Shadow => match ctx.shadow.as_ref().filter(|s| s.conflict) {
            Some(shadow) => format!(
                "Great question — yes, there's a CONFLICT between our two models right now.\n\n\
The standard rule (simple threshold logic) says: {} — {}\n\n\
But the DRL policy (our trained neural network) says: {} — {}\n\n\
The enterprise verdict goes with: {}. This is exactly why we run both models side-by-side — the DRL considers \
factors the simple rule can't see, like labor availability and total cost optimization. \
The conflict saved us ${:.0} this round.",
                shadow.rule_decision,
                shadow.rule_reason,
                shadow.policy_decision,
                shadow.policy_reason,
                shadow.verdict,
                shadow.estimated_cost_saved
            ),
            None => format!(
                "Both models are in agreement right now — no conflict. The standard rule and the DRL policy both \
recommend {action}. When they agree, it's a strong signal that the decision is solid."
            ),
        },
        Intent::Crew if ctx.technician_available => format!(
            "The assigned technician is on shift with {shift_h:.1} hours remaining. That's {} for an express install.\n\n\
The DRL factors this into its decision — if the tech only had 30 minutes left, there's no point rushing a part \
that can't be installed until tomorrow anyway.",
            if shift_h > 2.0 { "plenty of time" } else { "cutting it tight" }
        ),
        Intent::Crew => format!(
            "The tech is currently off shift. This is actually a key factor — express-shipping a $350 part right now \
means it sits on the dock until someone's available to install it.\n\n\
Shift time logged: {shift_h:.1}h. The DRL model uses this to avoid wasteful spending."
        ),
        Intent::Explain => format!(
            "Let me walk you through the DRL's reasoning for {eid}:\n\n\
The model evaluated four inputs simultaneously:\n\
1. RUL = {rul:.0} cycles — {}\n\
2. Vibration = {vib:.4} g — {}\n\
3. Technician shift = {shift_h:.1}h remaining — {}\n\
4. Express part cost = $350\n\n\
Based on 50,000+ training episodes, the neural network determined: {}.\n\n{}",
            if rul < 10.0 { "critically low" } else { "within safe range" },
            if vib > 0.15 { "elevated" } else { "normal" },
            if shift_h > 1.5 { "enough time" } else { "tight window" },
            ctx.action_label.replace('_', " "),
            ctx.reason
        )
        .trim_end()
        .to_string(),
        Intent::Help => HELP_REPLY.to_string(),
        Intent::Risk if rul < 5.0 => format!(
            "⚠️ Yes — {eid} is at elevated risk. With {rul:.0} cycles remaining, we're in the danger zone. \
Vibration at {vib:.4} g confirms mechanical stress.\n\n\
My recommendation: {}",
            if approving {
                "the DRL has already approved express shipping — good."
            } else {
                "consider typing Override to force express shipping past the DRL veto."
            }
        ),
        Intent::Risk => format!(
            "No immediate danger for {eid}. RUL is {rul:.0} cycles — that gives us comfortable runway. \
Vibration is at {vib:.4} g, well within spec.\n\n\
That said, I'm monitoring continuously. If conditions change, I'll flag it."
        ),
        Intent::General => format!(
            "I'm tracking {eid} right now — status is {}, with {rul:.0} cycles of life remaining. {}\n\n\
Want me to go deeper? Ask about the cost logic, shadow model conflict, or crew availability — \
or type \"help\" for the full menu.",
            ctx.status,
            if ctx.action_label.contains("VETO") {
                "The DRL vetoed express shipping to save $350."
            } else {
                "Express shipping has been approved — part is on the way."
            }
        ),
    }
}

fn downtime_reply(ctx: &ChatContext) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let secs = ctx.downtime_seconds.max(0.0) as u64;
    if secs == 0 {
        return format!("{} is currently operational — no active downtime.", ctx.unit_id);
    }
    #[allow(clippy::cast_precision_loss)]
    let lost = (secs as f64 / 3600.0 * defaults::PRODUCTION_LOSS_PER_HOUR).round();
    let reactive_total = defaults::DOWNTIME_REACTIVE_HR * defaults::PRODUCTION_LOSS_PER_HOUR;
    format!(
        "{} has been offline for {} since the failure triggered.\n\n\
At an estimated production loss rate of ~$1,250/hr, that's approximately ${} in lost output so far.\n\n\
Reactive maintenance averages 48h of downtime per event — ${} total. Gantry 3.0's predictive approach targets \
a 2h swap window. Once the technician executes the DRL-recommended action, we should be back up quickly.",
        ctx.unit_id,
        format_duration(secs),
        with_thousands(lost),
        with_thousands(reactive_total)
    )
}

/// `"4m 12s"` / `"42s"` / `"0s"`.
pub fn format_duration(secs: u64) -> String {
    let (m, s) = (secs / 60, secs % 60);
    if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Whole dollars with comma grouping.
pub fn with_thousands(value: f64) -> String {
    let rounded = format!("{:.0}", value.abs());
    let mut out = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (i, ch) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0.0 && out != "0" {
        out.insert(0, '-');
    }
    out
}

fn spoken(label: &str) -> String {
    label.replace('_', " ").to_lowercase()
}
