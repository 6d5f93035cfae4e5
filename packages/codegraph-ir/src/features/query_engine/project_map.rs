//! Project map (spec §4.6 "Project map"): per-file statistics, complexity
//! hotspots, entry-point detection, and language distribution across a
//! whole project.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::features::cross_file::SourceUnit;
use crate::features::flow_graph::build_cfg;
use crate::shared::models::pir::{FunctionData, NodeKind};
use crate::shared::models::symbol::Language;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStats {
    pub path: String,
    pub language: &'static str,
    pub loc: usize,
    pub function_count: usize,
    pub class_count: usize,
    /// Sum of per-function McCabe cyclomatic complexity (spec SPEC_FULL
    /// §11: the metric this spec fixes for "complexity", since spec §4.6
    /// names the field without defining the formula).
    pub complexity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotspot {
    pub path: String,
    pub function_name: String,
    pub complexity: usize,
}

/// A function that looks like a program entry point: named `main`, a
/// framework route handler (`@app.route`/`@router.get`-style decorator),
/// or a CLI-entry decorator (`@click.command`, `@app.command`, argparse
/// `if __name__ == "__main__"` is structural and not a function, so it is
/// not detected here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPoint {
    pub path: String,
    pub function_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMap {
    pub files: Vec<FileStats>,
    pub hotspots: Vec<Hotspot>,
    pub entry_points: Vec<EntryPoint>,
    pub language_distribution: HashMap<String, usize>,
}

const ROUTE_DECORATOR_MARKERS: &[&str] = &[".route", ".get(", ".post(", ".put(", ".delete(", "@app.", "@router."];
const CLI_DECORATOR_MARKERS: &[&str] = &["click.command", "app.command", "@cli.command"];

fn classify_entry_point(source_text: &str) -> Option<&'static str> {
    if ROUTE_DECORATOR_MARKERS.iter().any(|m| source_text.contains(m)) {
        Some("HTTP route handler")
    } else if CLI_DECORATOR_MARKERS.iter().any(|m| source_text.contains(m)) {
        Some("CLI entry-decorated function")
    } else {
        None
    }
}

/// Builds the project map for `units`, each already lowered to PIR with a
/// resolved symbol table. `top_n` bounds the hotspot list (spec §4.6
/// "top-N complexity hotspots").
pub fn build_project_map(units: &[SourceUnit], top_n: usize) -> ProjectMap {
    let mut files = Vec::with_capacity(units.len());
    let mut all_hotspots = Vec::new();
    let mut entry_points = Vec::new();
    let mut language_distribution: HashMap<String, usize> = HashMap::new();

    for unit in units {
        *language_distribution.entry(unit.language.as_str().to_string()).or_insert(0) += 1;

        let loc = unit.program.root_node().span.line_count() as usize;
        let function_nodes = unit.program.function_nodes();
        let class_nodes = unit.program.class_nodes();
        let mut file_complexity = 0usize;

        for &f in &function_nodes {
            let FunctionData { name, decorators, .. } = match &unit.program.get(f).kind {
                NodeKind::Function(data) => data,
                _ => continue,
            };
            let cfg = build_cfg(&unit.program, f);
            let complexity = cfg.cyclomatic_complexity();
            file_complexity += complexity;

            all_hotspots.push(Hotspot {
                path: unit.path.display().to_string(),
                function_name: name.clone(),
                complexity,
            });

            if name == "main" {
                entry_points.push(EntryPoint {
                    path: unit.path.display().to_string(),
                    function_name: name.clone(),
                    reason: "function named 'main'".to_string(),
                });
                continue;
            }
            let decorator_text = decorators.join(" ");
            if let Some(reason) = classify_entry_point(&decorator_text) {
                entry_points.push(EntryPoint {
                    path: unit.path.display().to_string(),
                    function_name: name.clone(),
                    reason: reason.to_string(),
                });
            }
        }

        files.push(FileStats {
            path: unit.path.display().to_string(),
            language: unit.language.as_str(),
            loc,
            function_count: function_nodes.len(),
            class_count: class_nodes.len(),
            complexity: file_complexity,
        });
    }

    all_hotspots.sort_by(|a, b| b.complexity.cmp(&a.complexity).then(a.path.cmp(&b.path)));
    all_hotspots.truncate(top_n);

    files.sort_by(|a, b| a.path.cmp(&b.path));
    entry_points.sort_by(|a, b| a.path.cmp(&b.path).then(a.function_name.cmp(&b.function_name)));

    ProjectMap { files, hotspots: all_hotspots, entry_points, language_distribution }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::cross_file::build_project;
    use crate::features::ir_generation::python;
    use crate::features::parsing::python::PythonFrontEnd;
    use crate::features::parsing::{FrontEnd, ParseOptions};
    use crate::features::type_resolution::SymbolTable;
    use crate::shared::models::SourceUnitId;
    use std::path::PathBuf;

    fn unit(path: &str, module_path: &str, src: &str) -> SourceUnit {
        let fe = PythonFrontEnd;
        let native = fe.parse(src, ParseOptions::default()).unwrap();
        let program = python::lower(&native, SourceUnitId(0));
        SourceUnit {
            path: PathBuf::from(path),
            module_path: module_path.to_string(),
            language: Language::Python,
            program,
            table: SymbolTable::default(),
        }
    }

    #[test]
    fn detects_main_as_an_entry_point() {
        let units = vec![unit("main.py", "main", "def main():\n    return 0\n")];
        let (units, _) = build_project(units);
        let map = build_project_map(&units, 10);
        assert!(map.entry_points.iter().any(|e| e.function_name == "main"));
    }

    #[test]
    fn hotspots_are_sorted_by_complexity_descending() {
        let units = vec![unit(
            "a.py",
            "a",
            "def simple():\n    return 1\n\ndef complex_one(x):\n    if x > 1:\n        return 1\n    elif x > 2:\n        return 2\n    else:\n        return 3\n",
        )];
        let (units, _) = build_project(units);
        let map = build_project_map(&units, 10);
        assert_eq!(map.hotspots[0].function_name, "complex_one");
    }

    #[test]
    fn language_distribution_counts_units() {
        let units = vec![unit("a.py", "a", "x = 1\n"), unit("b.py", "b", "y = 2\n")];
        let (units, _) = build_project(units);
        let map = build_project_map(&units, 10);
        assert_eq!(map.language_distribution.get("python"), Some(&2));
    }
}
