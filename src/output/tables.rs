use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use super::styling::Tone;
use crate::providers::circleci::{Workflow, WorkflowStatus};

pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn status_cell(status: &WorkflowStatus) -> Cell {
    let color = match Tone::of(status) {
        Tone::Done => TableColor::Green,
        Tone::Stopped => TableColor::Red,
        Tone::Active => TableColor::Yellow,
    };
    Cell::new(status.as_str()).fg(color)
}

/// One row per workflow: name, status, id.
pub fn workflow_table(workflows: &[Workflow]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Workflow", "Status", "ID"]);
    for workflow in workflows {
        table.add_row(vec![
            Cell::new(&workflow.name),
            status_cell(&workflow.status),
            Cell::new(&workflow.id),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_table_lists_each_workflow() {
        let workflows = vec![Workflow {
            id: "w-1".to_string(),
            name: "build".to_string(),
            status: WorkflowStatus::Success,
            pipeline_id: "p".to_string(),
            pipeline_number: 3,
            project_slug: "gh/org/repo".to_string(),
            created_at: None,
            stopped_at: None,
        }];

        let rendered = workflow_table(&workflows).to_string();
        assert!(rendered.contains("build"));
        assert!(rendered.contains("success"));
        assert!(rendered.contains("w-1"));
    }
}
