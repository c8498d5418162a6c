//! Adapter for trip-planner responses.
//!
//! Plans are source independent: a leg may ride any network's bus. Each leg
//! becomes one instruction and every plan is closed by an `End` instruction
//! at the destination.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use crate::models::types::*;
use crate::spatial::{decode_polyline, path_length};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PlannerResponse {
    pub plans: Vec<PlannerPlan>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PlannerPlan {
    pub start: i64,
    pub end: i64,
    pub legs: Vec<PlannerLeg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegMode {
    Bus,
    Walk,
    Wait,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PlannerLeg {
    pub mode: LegMode,
    pub start: i64,
    pub end: i64,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub route: Option<String>,
    /// Encoded polyline; empty for legs without geometry.
    #[serde(default)]
    pub points: String,
    #[serde(default)]
    pub steps: Vec<PlannerStep>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PlannerStep {
    pub instruction: String,
    pub distance: f64,
}

/// Convert planner output, formatting times in the agency's `offset`.
pub fn plans(response: &PlannerResponse, offset: FixedOffset) -> Result<Vec<PlanItem>> {
    response.plans.iter().map(|plan| plan_item(plan, offset)).collect()
}

fn plan_item(plan: &PlannerPlan, offset: FixedOffset) -> Result<PlanItem> {
    let destination = plan
        .legs
        .last()
        .map(|leg| leg.to.as_str())
        .ok_or_else(|| TransitError::InvalidData("trip plan has no legs".to_string()))?;

    let mut instructions = plan
        .legs
        .iter()
        .map(|leg| instruction(leg, offset))
        .collect::<Result<Vec<_>>>()?;

    let end_text = time_text(plan.end, offset)?;
    instructions.push(PlanInstruction {
        movement: Movement::End,
        time_text: end_text.clone(),
        text: format!("Arrive at {destination}").into(),
        path: Vec::new(),
        walking_steps: Vec::new(),
    });

    Ok(PlanItem {
        start: plan.start,
        end: plan.end,
        end_text,
        instructions,
    })
}

fn instruction(leg: &PlannerLeg, offset: FixedOffset) -> Result<PlanInstruction> {
    let path = decode_polyline(&leg.points)?;

    let (movement, text) = match leg.mode {
        LegMode::Bus => {
            let text = match &leg.route {
                Some(route) => format!("Take {route} to {}", leg.to),
                None => format!("Take the bus to {}", leg.to),
            };
            (Movement::Bus, text)
        }
        LegMode::Walk => {
            let meters = path_length(&path).round();
            (Movement::Walking, format!("Walk {meters:.0} m to {}", leg.to))
        }
        LegMode::Wait => (Movement::Waiting, format!("Wait at {}", leg.from)),
    };

    let walking_steps = match leg.mode {
        LegMode::Walk => leg
            .steps
            .iter()
            .map(|step| WalkingStep {
                text: step.instruction.as_str().into(),
                distance_m: step.distance,
            })
            .collect(),
        LegMode::Bus | LegMode::Wait => Vec::new(),
    };

    Ok(PlanInstruction {
        movement,
        time_text: time_text(leg.start, offset)?,
        text: text.into(),
        path,
        walking_steps,
    })
}

fn time_text(epoch_seconds: i64, offset: FixedOffset) -> Result<std::sync::Arc<str>> {
    let time = DateTime::from_timestamp(epoch_seconds, 0)
        .ok_or_else(|| TransitError::InvalidTimestamp(epoch_seconds.to_string()))?
        .with_timezone(&offset);
    Ok(time.format("%-I:%M %p").to_string().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 2024-03-01 13:00:00 UTC
    const T0: i64 = 1_709_298_000;

    fn eastern() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn fixture() -> PlannerResponse {
        serde_json::from_value(json!({
            "plans": [{
                "start": T0,
                "end": T0 + 1500,
                "legs": [
                    { "mode": "WALK", "start": T0, "end": T0 + 300, "from": "Origin",
                      "to": "Blake TC", "points": "_p~iF~ps|U_ulLnnqC",
                      "steps": [{ "instruction": "Head north on State St", "distance": 120.0 }] },
                    { "mode": "WAIT", "start": T0 + 300, "end": T0 + 420,
                      "from": "Blake TC", "to": "Blake TC" },
                    { "mode": "BUS", "start": T0 + 420, "end": T0 + 1500, "from": "Blake TC",
                      "to": "Ypsi TC", "route": "4", "points": "_ulLnnqC_mqNvxq`@" }
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_plan_instructions() {
        let plans = plans(&fixture(), eastern()).unwrap();
        assert_eq!(plans.len(), 1);

        let plan = &plans[0];
        assert_eq!(plan.start, T0);
        assert_eq!(plan.end_text.as_ref(), "8:25 AM");

        let movements: Vec<Movement> = plan.instructions.iter().map(|i| i.movement).collect();
        assert_eq!(
            movements,
            vec![Movement::Walking, Movement::Waiting, Movement::Bus, Movement::End]
        );

        let walk = &plan.instructions[0];
        assert_eq!(walk.time_text.as_ref(), "8:00 AM");
        assert!(walk.text.starts_with("Walk "));
        assert!(walk.text.ends_with(" m to Blake TC"));
        assert_eq!(walk.path.len(), 2);
        assert_eq!(walk.walking_steps.len(), 1);

        let wait = &plan.instructions[1];
        assert!(wait.path.is_empty());
        assert_eq!(wait.text.as_ref(), "Wait at Blake TC");

        assert_eq!(plan.instructions[2].text.as_ref(), "Take 4 to Ypsi TC");
        assert_eq!(plan.instructions[3].text.as_ref(), "Arrive at Ypsi TC");
        assert!(plan.instructions[3].path.is_empty());
    }

    #[test]
    fn test_plan_without_legs() {
        let response: PlannerResponse = serde_json::from_value(json!({
            "plans": [{ "start": T0, "end": T0, "legs": [] }]
        }))
        .unwrap();

        assert!(matches!(
            plans(&response, eastern()),
            Err(TransitError::InvalidData(_))
        ));
    }

    #[test]
    fn test_plan_with_bad_geometry() {
        let mut response = fixture();
        response.plans[0].legs[2].points = "_p~iF".to_string();

        assert!(matches!(
            plans(&response, eastern()),
            Err(TransitError::InvalidPolyline(_))
        ));
    }
}
