//! Rule-based plan analysis and resource suggestions. No model calls.

use serde::{Deserialize, Serialize};

use crate::plan::{Breakdown, BreakdownRequest, EffortUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub skill_level: Option<SkillLevel>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAnalysis {
    pub complexity: Complexity,
    pub time_optimization_opportunities: Vec<String>,
    pub resource_requirements: Vec<String>,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
}

struct KeywordGroup {
    keywords: &'static [&'static str],
    requirements: &'static [&'static str],
    resources: &'static [&'static str],
}

const KEYWORD_GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        keywords: &["programming", "coding", "development"],
        requirements: &[
            "Development environment and code editor",
            "Practice projects and coding exercises",
        ],
        resources: &[
            "FreeCodeCamp for interactive coding practice",
            "GitHub for version control and portfolio projects",
            "Stack Overflow for problem-solving",
        ],
    },
    KeywordGroup {
        keywords: &["design", "ui", "ux"],
        requirements: &[
            "Design tools (Figma, Adobe Creative Suite)",
            "Design inspiration and reference materials",
        ],
        resources: &[
            "Figma for design prototyping",
            "Dribbble for design inspiration",
            "Adobe Creative Suite for professional tools",
        ],
    },
    KeywordGroup {
        keywords: &["business", "entrepreneurship", "startup"],
        requirements: &[],
        resources: &[
            "Y Combinator Startup School for business fundamentals",
            "Lean Canvas for business model planning",
            "Google Analytics for market research",
        ],
    },
    KeywordGroup {
        keywords: &["language", "speaking", "communication"],
        requirements: &[
            "Language learning apps or courses",
            "Practice conversation partners",
        ],
        resources: &[
            "Duolingo for vocabulary building",
            "iTalki for conversation practice",
            "Anki for spaced repetition learning",
        ],
    },
];

const GENERIC_RESOURCES: &[&str] = &[
    "YouTube for tutorial videos",
    "Notion for organizing learning materials",
    "Pomodoro timer for focused study sessions",
];

pub fn analyze_breakdown(
    request: &BreakdownRequest,
    breakdown: &Breakdown,
    preferences: Option<&UserPreferences>,
) -> TaskAnalysis {
    let units = breakdown.len();
    let tasks_per_unit = if units == 0 {
        0.0
    } else {
        breakdown.task_count() as f64 / units as f64
    };
    let skill = preferences.and_then(|p| p.skill_level);
    let daily_hours = request.daily_hours_commitment();

    let complexity = adjust_for_skill(base_complexity(units, tasks_per_unit), skill);

    let mut time_optimization_opportunities = Vec::new();
    if units > 26 {
        time_optimization_opportunities.push(format!(
            "Consider increasing daily commitment from {} to {} hours to reduce plan duration",
            daily_hours,
            daily_hours + 1
        ));
    }
    if tasks_per_unit > 20.0 {
        time_optimization_opportunities.push(
            "Some periods have high task density - consider redistributing tasks for better balance"
                .to_string(),
        );
    }
    if request.effort_unit() == EffortUnit::Months && request.total_effort() > 6 {
        time_optimization_opportunities
            .push("Long-term goals benefit from quarterly milestones and progress reviews".to_string());
    }

    let content = breakdown
        .units
        .iter()
        .flat_map(|u| u.subtasks.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let resource_requirements = KEYWORD_GROUPS
        .iter()
        .filter(|g| g.keywords.iter().any(|k| mentions(&content, k)))
        .flat_map(|g| g.requirements.iter().map(|r| r.to_string()))
        .collect();

    let mut risk_factors = Vec::new();
    if units > 40 {
        risk_factors.push("Long-term commitment may lead to motivation challenges".to_string());
    }
    if daily_hours > 4 {
        risk_factors.push("High daily commitment may not be sustainable long-term".to_string());
    }
    if tasks_per_unit > 25.0 {
        risk_factors.push("High task density may cause overwhelm".to_string());
    }

    TaskAnalysis {
        complexity,
        time_optimization_opportunities,
        resource_requirements,
        risk_factors,
        recommendations: recommendations(units, daily_hours, complexity, skill),
    }
}

/// Keyword-driven resources for a goal, followed by generic ones.
pub fn suggest_resources(goal: &str) -> Vec<String> {
    let content = goal.to_lowercase();

    KEYWORD_GROUPS
        .iter()
        .filter(|g| g.keywords.iter().any(|k| mentions(&content, k)))
        .flat_map(|g| g.resources.iter())
        .chain(GENERIC_RESOURCES.iter())
        .map(|r| r.to_string())
        .collect()
}

fn base_complexity(units: usize, tasks_per_unit: f64) -> Complexity {
    if units <= 4 && tasks_per_unit <= 15.0 {
        Complexity::Low
    } else if units > 26 || tasks_per_unit > 25.0 {
        Complexity::High
    } else {
        Complexity::Medium
    }
}

fn adjust_for_skill(base: Complexity, skill: Option<SkillLevel>) -> Complexity {
    match skill {
        Some(SkillLevel::Beginner) => match base {
            Complexity::Low => Complexity::Medium,
            _ => Complexity::High,
        },
        Some(SkillLevel::Advanced) => match base {
            Complexity::High => Complexity::Medium,
            _ => Complexity::Low,
        },
        Some(SkillLevel::Intermediate) | None => base,
    }
}

fn recommendations(
    units: usize,
    daily_hours: u32,
    complexity: Complexity,
    skill: Option<SkillLevel>,
) -> Vec<String> {
    let mut out: Vec<&str> = Vec::new();

    match skill {
        Some(SkillLevel::Beginner) => out.extend([
            "Start with shorter daily sessions to build consistency",
            "Focus on understanding fundamentals before moving to advanced topics",
        ]),
        Some(SkillLevel::Advanced) => out.extend([
            "Consider taking on challenging projects to accelerate learning",
            "Look for opportunities to teach or mentor others in this area",
        ]),
        _ => {}
    }

    if complexity == Complexity::High {
        out.extend([
            "Break down complex periods into smaller, manageable daily goals",
            "Schedule regular progress reviews to stay on track",
            "Prepare for challenges by building in buffer time",
        ]);
    }

    if units > 26 {
        out.extend([
            "Consider quarterly goal reviews and plan adjustments",
            "Build in motivation strategies for long-term commitment",
        ]);
    } else if units < 4 {
        out.push("Make the most of your intensive timeline with daily progress tracking");
    }

    if daily_hours >= 3 {
        out.extend([
            "Schedule regular breaks to prevent burnout",
            "Consider alternating between intensive and lighter days",
        ]);
    }

    out.into_iter().map(String::from).collect()
}

/// Two-letter keywords ("ui") must be whole words; longer ones may appear
/// inside other words ("development" in "web development").
fn mentions(content: &str, keyword: &str) -> bool {
    if keyword.len() <= 2 {
        content
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == keyword)
    } else {
        content.contains(keyword)
    }
}
