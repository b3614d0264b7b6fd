//! Epilogue that runs the bundled functions per content-script entry: URL
//! guard, DOM-ready timing, then either direct calls or a page `<script>`.

use std::fmt::Write as _;
use std::path::Path;

use crate::manifest::resources::{absolutize, path_key};
use crate::manifest::{ContentScriptEntry, RunAt};

use super::codeblock::function_name;
use super::header::ALL_URLS;

/// Shared helpers every synthesized userscript starts with. `crxm_policy`
/// returns `null` when Trusted Types is missing or refuses the policy.
pub const PRELUDE: &str = r#"const crxm_window = typeof unsafeWindow !== 'undefined' ? unsafeWindow : window;
const crxm_policies = {};
function crxm_policy(name) {
  const tt = crxm_window.trustedTypes;
  if (!tt || typeof tt.createPolicy !== 'function') return null;
  if (!Object.prototype.hasOwnProperty.call(crxm_policies, name)) {
    try {
      crxm_policies[name] = tt.createPolicy(name, {
        createHTML: (input) => input,
        createScript: (input) => input,
      });
    } catch (_) {
      crxm_policies[name] = null;
    }
  }
  return crxm_policies[name];
}
"#;

const REGEX_META: &[char] = &['\\', '^', '$', '.', '|', '?', '*', '+', '(', ')', '[', ']', '{', '}'];

fn escape_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if REGEX_META.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Chrome match pattern → regular expression source for `location.href`.
///
/// `*` scheme is `http|https`, `*.host` also matches the bare host, a host
/// without a port matches any port, `*` in the path matches anything.
/// Anything that isn't `scheme://host/path` is matched literally.
pub fn match_pattern_to_regex(pattern: &str) -> String {
    let Some((scheme, rest)) = pattern.split_once("://") else {
        return format!("^{}$", escape_regex(pattern));
    };

    let (host, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };

    let scheme = match scheme {
        "*" => "https?".to_string(),
        other => escape_regex(other),
    };

    let mut host_re = match host {
        "" => String::new(),
        "*" => "[^/]*".to_string(),
        h => match h.strip_prefix("*.") {
            Some(domain) => format!(r"([^/]*\.)?{}", escape_regex(domain)),
            None => escape_regex(h),
        },
    };
    if !host.is_empty() && !host.contains(':') {
        host_re.push_str(r"(:\d+)?");
    }

    let path_re = if path.is_empty() {
        "/?".to_string()
    } else {
        path.split('*').map(escape_regex).collect::<Vec<_>>().join(".*")
    };

    format!("^{scheme}://{host_re}{path_re}(#.*)?$")
}

/// JS condition for an entry's `matches`. `<all_urls>` short-circuits to `true`.
pub fn url_guard(matches: &[String]) -> String {
    if matches.is_empty() {
        return "false".to_string();
    }
    if matches.iter().any(|m| m == ALL_URLS) {
        return "true".to_string();
    }
    matches
        .iter()
        .map(|m| {
            let source = serde_json::Value::String(match_pattern_to_regex(m)).to_string();
            format!("new RegExp({source}).test(location.href)")
        })
        .collect::<Vec<_>>()
        .join(" || ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InjectGroup {
    matches: Vec<String>,
    run_at: RunAt,
    dom_inject: bool,
    trusted: bool,
    styles: Vec<String>,
    scripts: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CodeInjector {
    groups: Vec<InjectGroup>,
}

impl CodeInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one content-script entry. Resource paths resolve against
    /// `project_dir`, the same way the function names were derived.
    pub fn add_entry(&mut self, entry: &ContentScriptEntry, project_dir: &Path) {
        let names = |raws: &[String]| -> Vec<String> {
            raws.iter()
                .map(|raw| function_name(&path_key(&absolutize(project_dir, raw))))
                .collect()
        };
        let (styles, scripts) = (names(&entry.css), names(&entry.js));
        if styles.is_empty() && scripts.is_empty() {
            return;
        }
        self.groups.push(InjectGroup {
            matches: entry.matches.clone(),
            run_at: entry.run_at(),
            dom_inject: entry.dom_inject(),
            trusted: entry.trusted_inject(),
            styles,
            scripts,
        });
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn code(&self) -> String {
        let mut code = String::new();
        for (i, group) in self.groups.iter().enumerate() {
            let body = run_body(i, group);
            let _ = writeln!(code, "\nif ({}) {{", url_guard(&group.matches));
            match group.run_at {
                RunAt::DocumentStart => code.push_str(&body),
                timing => code.push_str(&on_ready(i, timing, &body)),
            }
            code.push_str("}\n");
        }
        code
    }
}

fn run_body(i: usize, group: &InjectGroup) -> String {
    let mut body = String::new();
    for style in &group.styles {
        let _ = writeln!(body, "  {style}();");
    }

    if !group.dom_inject {
        for script in &group.scripts {
            let _ = writeln!(body, "  {script}();");
        }
        return body;
    }
    if group.scripts.is_empty() {
        return body;
    }

    let el = format!("crxm_script_{i}");
    let text = format!("crxm_code_{i}");
    let _ = writeln!(body, "  const {el} = crxm_window.document.createElement('script');");
    let _ = writeln!(
        body,
        "  const {text} = [{}].map((f) => `(${{f.toString()}})();`).join('\\n');",
        group.scripts.join(", ")
    );
    if group.trusted {
        let policy = format!("crxm_policy_{i}");
        let _ = writeln!(body, "  const {policy} = crxm_policy('crxm-trusted-inject-policy-{i}');");
        let _ = writeln!(body, "  if ({policy} !== null) {{");
        let _ = writeln!(body, "    {el}.text = {policy}.createScript({text});");
        let _ = writeln!(body, "  }} else {{");
        let _ = writeln!(body, "    {el}.textContent = {text};");
        let _ = writeln!(body, "  }}");
    } else {
        let _ = writeln!(body, "  {el}.textContent = {text};");
    }
    let _ = writeln!(
        body,
        "  (crxm_window.document.head || crxm_window.document.documentElement).appendChild({el});"
    );
    body
}

/// Run `body` once, on the native or the loader's synthetic ready event.
fn on_ready(i: usize, run_at: RunAt, body: &str) -> String {
    let ran = format!("crxm_ran_{i}");
    let run = format!("crxm_run_{i}");
    let inner = match run_at {
        RunAt::DocumentIdle => format!("    setTimeout(() => {{\n{body}    }}, 1);\n"),
        _ => body.to_string(),
    };
    format!(
        "  let {ran} = false;
  const {run} = () => {{
    if ({ran}) return;
    {ran} = true;
{inner}  }};
  document.addEventListener('DOMContentLoaded', {run});
  document.addEventListener('crxm_DOMContentLoaded', {run});
"
    )
}
