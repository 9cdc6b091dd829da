use crate::plan::{hours_noun, BreakdownRequest, Granularity, PlanSizing};
use crate::types::{breakdown_typedef, TypeDef};

pub fn breakdown_system_prompt() -> String {
    let mut s = String::new();

    s.push_str("You are an expert project manager who breaks large goals into achievable, ");
    s.push_str("concrete units of work.\n");
    s.push_str("You strictly output JSON. Produce a JSON object that matches this schema:\n\n");
    s.push_str(&describe_schema(&breakdown_typedef(), 0));
    s.push_str("\nThe JSON must be parseable and must not contain comments or explanations.\n");
    s.push_str("Do not wrap it in markdown code fences.\n");

    s
}

/// User message for a whole plan (`range == None`) or for one batch of a
/// chunked plan (`range == Some((first, last))`, 1-based and inclusive).
pub fn breakdown_user_prompt(
    request: &BreakdownRequest,
    sizing: &PlanSizing,
    range: Option<(usize, usize)>,
) -> String {
    let period = request.granularity().period_name();
    let mut s = String::new();

    s.push_str("Goal: ");
    s.push_str(request.goal());
    s.push_str(&format!(
        "\nTotal effort: {} {}\n",
        request.total_effort(),
        request.effort_unit().as_str()
    ));
    let daily = u64::from(request.daily_hours_commitment());
    s.push_str(&format!(
        "Daily commitment: {} {} per day\n",
        daily,
        hours_noun(daily)
    ));
    s.push_str(&format!(
        "Plan granularity: {} ({} {} of work over {} days in total)\n\n",
        request.granularity().as_str(),
        sizing.total_hours,
        hours_noun(sizing.total_hours),
        sizing.total_days
    ));

    let (first, last) = range.unwrap_or((1, sizing.unit_count));
    let count = last + 1 - first;

    match range {
        Some(_) => {
            s.push_str(&format!(
                "The full plan has {} {}s. Produce ONLY {} {} through {} {} ({} units).\n",
                sizing.unit_count,
                period.to_lowercase(),
                period,
                first,
                period,
                last,
                count
            ));
            s.push_str("Earlier and later periods are generated separately; keep this part ");
            s.push_str("consistent with a steady progression towards the goal.\n");
        }
        None => {
            s.push_str(&format!(
                "Produce exactly {} units, one per {}.\n",
                count,
                period.to_lowercase()
            ));
        }
    }

    s.push_str("Label the units exactly like this:\n");
    s.push_str(&format!("- \"{}\"\n", request.unit_label(first)));
    if last > first {
        s.push_str(&format!("- ...\n- \"{}\"\n", request.unit_label(last)));
    }

    s.push_str("\nEach unit must list 2 to 5 specific, actionable tasks");
    match request.granularity() {
        Granularity::Daily => s.push_str(" that fit into a single day's commitment.\n"),
        Granularity::Weekly => s.push_str(" that fit into one week of work.\n"),
    }

    s
}

/// System and user messages for the one-sentence summary.
pub fn summary_prompts(plan_text: &str) -> (String, String) {
    let system = "You summarize project plans. Reply with one short sentence and nothing else."
        .to_string();

    let mut user = String::new();
    user.push_str("Summarize the following task breakdown in one short sentence:\n\n");
    user.push_str(plan_text);

    (system, user)
}

// Human-readable schema description for the prompt.
fn describe_schema(ty: &TypeDef, indent: usize) -> String {
    let mut s = String::new();
    let pad = " ".repeat(indent);

    match ty {
        TypeDef::Text { non_empty } => {
            s.push_str(&format!("{pad}- {}\n", text_name(*non_empty)));
        }
        TypeDef::List { item, non_empty } => {
            s.push_str(&format!("{pad}- {}:\n", list_name(*non_empty)));
            s.push_str(&describe_schema(item, indent + 2));
        }
        TypeDef::Object(fields) => {
            s.push_str(&format!("{pad}- object with fields:\n"));
            for f in fields {
                s.push_str(&format!("{pad}  - {}: ", f.name));
                match &f.ty {
                    TypeDef::Text { non_empty } => {
                        s.push_str(text_name(*non_empty));
                        s.push('\n');
                    }
                    TypeDef::List { item, non_empty } => {
                        s.push_str(list_name(*non_empty));
                        s.push_str(":\n");
                        s.push_str(&describe_schema(item, indent + 4));
                    }
                    TypeDef::Object(_) => {
                        s.push_str("nested object:\n");
                        s.push_str(&describe_schema(&f.ty, indent + 4));
                    }
                }
            }
        }
    }

    s
}

fn text_name(non_empty: bool) -> &'static str {
    if non_empty {
        "non-empty string"
    } else {
        "string"
    }
}

fn list_name(non_empty: bool) -> &'static str {
    if non_empty {
        "non-empty array of"
    } else {
        "array of"
    }
}
