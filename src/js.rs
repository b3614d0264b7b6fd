//! Thin oxc wrapper: parse JavaScript as a classic (non-module) script and print
//! it back. Content scripts, service worker bootstraps and the synthesized
//! userscript are all classic scripts.

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::{Parser, ParserReturn};
use oxc_span::SourceType;

fn script_source_type() -> SourceType {
    SourceType::default()
        .with_module(false)
        .with_typescript(false)
        .with_jsx(false)
}

const MODULE_SYNTAX: &str = "import/export declarations are not allowed in a classic script";

/// Parse `source` and re-emit it. Returns the parser diagnostics on failure.
pub fn reprint_script(source: &str) -> Result<String, Vec<String>> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, script_source_type()).parse();
    diagnostics(&ret)?;
    Ok(Codegen::new().build(&ret.program).code)
}

/// Syntax check only.
pub fn check_script(source: &str) -> Result<(), Vec<String>> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, script_source_type()).parse();
    diagnostics(&ret)
}

// The parser accepts `import`/`export` even for a script source type; the
// module record is what tells us they were there.
fn diagnostics(ret: &ParserReturn<'_>) -> Result<(), Vec<String>> {
    let mut messages: Vec<String> = ret.errors.iter().map(|e| e.to_string()).collect();
    if ret.module_record.has_module_syntax {
        messages.push(MODULE_SYNTAX.to_string());
    }
    if ret.panicked && messages.is_empty() {
        messages.push("parser gave up".to_string());
    }

    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reprints_valid_script() {
        let out = reprint_script("var a=1;function f(){return a}").unwrap();
        assert!(out.contains("function f()"));
    }

    #[test]
    fn module_syntax_is_rejected() {
        assert!(check_script("import x from 'y';").is_err());
        assert!(check_script("export const a = 1;").is_err());

        let errs = reprint_script("import x from 'y';\nexport const a = x;\n").unwrap_err();
        assert!(errs.iter().any(|e| e.contains("classic script")), "{errs:?}");
    }


    #[test]
    fn reports_syntax_errors() {
        let errs = reprint_script("function (").unwrap_err();
        assert!(!errs.is_empty());
    }
}
