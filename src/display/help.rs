//! Custom help formatting for consistent CLI display.

use crate::display::theme::Theme;
use console::style;

/// Format help text with consistent styling
pub fn format_help_section(title: &str, content: &str, indent: bool) -> String {
    let mut output = String::new();

    if Theme::should_disable_colors() {
        output.push_str(&format!("{title}\n"));
    } else {
        output.push_str(&format!("{}\n", style(title).cyan().bold()));
    }

    for line in content.lines() {
        if line.trim().is_empty() {
            output.push('\n');
        } else if indent && !line.starts_with("    ") {
            output.push_str(&format!("    {line}\n"));
        } else {
            output.push_str(&format!("{line}\n"));
        }
    }

    output
}

/// Text shown after the generated command list.
pub fn create_help_text() -> String {
    let mut help = String::new();

    let quick_start = r#"$ adasweep init
$ adasweep convert sift_base.fvecs data/sift/sift_base.bin
$ adasweep lid data/sift/sift_base.bin
$ adasweep sweep --dry-run"#;
    help.push_str(&format_help_section("QUICK START", quick_start, true));
    help.push('\n');

    let examples = r#"# Convert an NPY container directory (train/test/neighbors)
$ adasweep convert-npy glove-100/ data/glove --normalize

# Derive queries and ground truth from a base file
$ adasweep queries data/deep/deep_base.bin data/deep/deep_query.bin --count 10000
$ adasweep groundtruth data/deep/deep_base.bin data/deep/deep_query.bin data/deep/deep_gt.bin

# Summarize LID profiles and result directories
$ adasweep lid-stats data/*/*_lid.bin
$ adasweep aggregate experiments/fullscan
$ adasweep ledger"#;
    help.push_str(&format_help_section("EXAMPLES", examples, true));
    help.push('\n');

    let env = r#"RUST_LOG=adasweep=debug   log filter (overrides log_level)
AS_LID__K=30               any setting, '__' separates sections"#;
    help.push_str(&format_help_section("ENVIRONMENT", env, true));

    help
}
