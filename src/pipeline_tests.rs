//! End-to-end pipeline tests: full project fixtures compiled through `Vex`
//! and, where relevant, updated through a `WatchSession`.

use crate::ident::IdentifierMode;
use crate::vex::{CompilerOptions, Vex, VexOptions};
use crate::watch::{ChangeKind, WatchSession};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn vex_for(dir: &TempDir) -> Vex {
    Vex::new(
        CompilerOptions {
            root_dir: dir.path().to_path_buf(),
            out_dir: dir.path().join("out"),
            css_ext: None,
        },
        VexOptions::default(),
    )
}

fn write(dir: &TempDir, rel: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn read_out(dir: &TempDir, rel: &str) -> String {
    fs::read_to_string(dir.path().join("out").join(rel)).unwrap()
}

#[test]
fn test_simple_module_end_to_end() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "simple.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        export const cls = style({ backgroundColor: 'red', fontSize: 12 });
        "#,
    );
    let mut vex = vex_for(&dir);
    let summary = vex.process_files(|_| {}).unwrap();
    assert_eq!(summary.results.len(), 1);
    assert!(summary.errors.is_empty());

    let css = read_out(&dir, "simple.css.ts.vanilla.css");
    let class = css
        .lines()
        .next()
        .unwrap()
        .trim_start_matches('.')
        .trim_end_matches(" {")
        .to_string();
    assert_eq!(
        css,
        format!(".{} {{\n  background-color: red;\n  font-size: 12;\n}}\n", class)
    );

    let js = read_out(&dir, "simple.css.js");
    assert_eq!(
        js,
        format!(
            "import './simple.css.ts.vanilla.css';\n\nexport var cls = '{}';\n",
            class
        )
    );
    assert_eq!(
        read_out(&dir, "simple.css.d.ts"),
        "export declare var cls: string;\n"
    );
}

#[test]
fn test_three_module_project_with_theme() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "themes.css.ts",
        r#"
        import { createTheme } from '@vanilla-extract/css';
        export const [themeClass, vars] = createTheme({
            color: { brand: 'blue' },
            space: { small: '4px', large: '16px' },
        });
        "#,
    );
    write(
        &dir,
        "shared.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        export const base = style({ margin: 0, padding: 0 });
        "#,
    );
    write(
        &dir,
        "button.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        import { base } from './shared.css';
        import { vars } from './themes.css';
        export const button = style([base, {
            color: vars.color.brand,
            padding: vars.space.small,
        }]);
        "#,
    );

    let mut vex = vex_for(&dir);
    let summary = vex.process_files(|_| {}).unwrap();
    assert_eq!(summary.results.len(), 3);
    assert!(summary.errors.is_empty());

    // Import lines follow first-encounter scope order: imports before self.
    let js = read_out(&dir, "button.css.js");
    let imports: Vec<&str> = js.lines().take_while(|l| !l.is_empty()).collect();
    assert_eq!(
        imports,
        vec![
            "import './shared.css.ts.vanilla.css';",
            "import './themes.css.ts.vanilla.css';",
            "import './button.css.ts.vanilla.css';",
        ]
    );

    // The button rule resolves theme tokens to var references.
    let css = read_out(&dir, "button.css.ts.vanilla.css");
    assert!(css.contains("color: var(--"));
    assert!(css.contains("padding: var(--"));

    // The theme stylesheet assigns every token.
    let theme_css = read_out(&dir, "themes.css.ts.vanilla.css");
    assert_eq!(theme_css.matches(": ").count(), 3);

    let theme_dts = read_out(&dir, "themes.css.d.ts");
    assert!(theme_dts.contains("export declare var themeClass: string;"));
    assert!(theme_dts.contains("brand: string;"));
}

#[test]
fn test_artifacts_are_deterministic_across_fresh_compilers() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "a.css.ts",
        r#"
        import { style, keyframes } from '@vanilla-extract/css';
        const fade = keyframes({ from: { opacity: 0 }, to: { opacity: 1 } });
        export const cls = style({
            animationName: fade,
            '@media': { '(min-width: 600px)': { opacity: 0.5 } },
        });
        "#,
    );

    let run = || {
        let mut vex = vex_for(&dir);
        vex.process_files(|_| {}).unwrap();
        (
            read_out(&dir, "a.css.ts.vanilla.css"),
            read_out(&dir, "a.css.js"),
            read_out(&dir, "a.css.d.ts"),
        )
    };
    let first = run();
    let second = run();
    assert_eq!(first, second);
}

#[test]
fn test_identifiers_stable_regardless_of_entry_point() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "shared.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        export const base = style({ margin: 0 });
        "#,
    );
    write(
        &dir,
        "a.css.ts",
        "import { base } from './shared.css';\nexport const a = base;",
    );

    // Compile shared directly, then via the importer; its class is identical.
    let mut vex = vex_for(&dir);
    vex.process_files(|_| {}).unwrap();
    let direct = read_out(&dir, "shared.css.ts.vanilla.css");

    let mut vex = vex_for(&dir);
    vex.registry_mut().add_dir(dir.path()).unwrap();
    let result = vex.compile_module(&dir.path().join("a.css.ts")).unwrap();
    assert_eq!(result.extra_styles[0].contents, direct);
}

#[test]
fn test_debug_identifier_mode() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "button.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        export const primary = style({ color: 'blue' }, 'primary');
        "#,
    );
    let mut vex = Vex::new(
        CompilerOptions {
            root_dir: dir.path().to_path_buf(),
            out_dir: dir.path().join("out"),
            css_ext: None,
        },
        VexOptions {
            identifier: IdentifierMode::Debug,
            ..VexOptions::default()
        },
    );
    vex.process_files(|_| {}).unwrap();
    let js = read_out(&dir, "button.css.js");
    assert!(js.contains("button_primary__"));
}

#[test]
fn test_namespace_flows_into_scope_hash() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "a.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        export const a = style({ margin: 0 });
        "#,
    );
    let compile = |namespace: &str| {
        let mut vex = Vex::new(
            CompilerOptions {
                root_dir: dir.path().to_path_buf(),
                out_dir: dir.path().join("out"),
                css_ext: None,
            },
            VexOptions {
                namespace: namespace.to_string(),
                ..VexOptions::default()
            },
        );
        vex.process_files(|_| {}).unwrap();
        read_out(&dir, "a.css.ts.vanilla.css")
    };
    assert_ne!(compile("@acme/ui"), compile("@acme/web"));
}

#[test]
fn test_watch_update_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "a.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        export const a = style({ color: 'red' });
        "#,
    );
    let mut vex = vex_for(&dir);
    vex.process_files(|_| {}).unwrap();
    let before = read_out(&dir, "a.css.ts.vanilla.css");

    // Touch without content change, then report an update.
    let mut session = WatchSession::new(vex, 64);
    fs::write(&path, fs::read_to_string(&path).unwrap()).unwrap();
    session.handle_change(&path, ChangeKind::Updated).unwrap();
    assert_eq!(read_out(&dir, "a.css.ts.vanilla.css"), before);
}

#[test]
fn test_watch_invalidation_is_minimal() {
    let dir = TempDir::new().unwrap();
    write(&dir, "tokens.ts", "export const accent = 'rebeccapurple';");
    write(
        &dir,
        "uses.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        import { accent } from './tokens';
        export const cls = style({ color: accent });
        "#,
    );
    write(
        &dir,
        "standalone.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        export const cls = style({ color: 'black' });
        "#,
    );
    let mut vex = vex_for(&dir);
    vex.process_files(|_| {}).unwrap();
    let mut session = WatchSession::new(vex, 64);

    let tokens = write(&dir, "tokens.ts", "export const accent = 'hotpink';");
    let recompiled = session.handle_change(&tokens, ChangeKind::Updated).unwrap();
    assert_eq!(recompiled.len(), 1);
    assert!(recompiled[0].ends_with("uses.css.ts"));
    assert!(read_out(&dir, "uses.css.ts.vanilla.css").contains("hotpink"));
    assert!(read_out(&dir, "standalone.css.ts.vanilla.css").contains("black"));
}

#[test]
fn test_global_styles_and_font_faces() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "global.css.ts",
        r#"
        import { globalStyle, fontFace } from '@vanilla-extract/css';
        export const family = fontFace({ src: 'local("Comic Sans MS")' });
        globalStyle('html, body', { margin: 0, fontFamily: family });
        "#,
    );
    let mut vex = vex_for(&dir);
    let summary = vex.process_files(|_| {}).unwrap();
    assert!(summary.errors.is_empty());

    let css = read_out(&dir, "global.css.ts.vanilla.css");
    assert!(css.starts_with("@font-face {"));
    assert!(css.contains("html, body {"));
    assert!(css.contains("margin: 0;"));

    let js = read_out(&dir, "global.css.js");
    assert!(js.contains("export var family = '\\\"") || js.contains("export var family = '\""));
}

#[test]
fn test_theme_contract_form() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "themes.css.ts",
        r#"
        import { createTheme } from '@vanilla-extract/css';
        export const [lightClass, vars] = createTheme({ color: { bg: 'white' } });
        export const darkClass = createTheme(vars, { color: { bg: 'black' } });
        "#,
    );
    let mut vex = vex_for(&dir);
    let summary = vex.process_files(|_| {}).unwrap();
    assert!(summary.errors.is_empty());

    let css = read_out(&dir, "themes.css.ts.vanilla.css");
    assert!(css.contains(": white;"));
    assert!(css.contains(": black;"));

    let dts = read_out(&dir, "themes.css.d.ts");
    assert!(dts.contains("export declare var darkClass: string;"));
    assert!(dts.contains("export declare var lightClass: string;"));
}

#[test]
fn test_custom_css_extension() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "a.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        export const a = style({ color: 'red' });
        "#,
    );
    let mut vex = Vex::new(
        CompilerOptions {
            root_dir: dir.path().to_path_buf(),
            out_dir: dir.path().join("out"),
            css_ext: Some(".generated.css".to_string()),
        },
        VexOptions::default(),
    );
    vex.process_files(|_| {}).unwrap();
    // A custom extension replaces the language extension of the source name.
    assert!(dir.path().join("out/a.css.generated.css").is_file());
    let js = read_out(&dir, "a.css.js");
    assert!(js.contains("import './a.css.generated.css';"));
}

#[test]
fn test_nested_directories_mirrored_in_output() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "components/button/button.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        import { base } from '../../shared.css';
        export const cls = style([base, { color: 'red' }]);
        "#,
    );
    write(
        &dir,
        "shared.css.ts",
        r#"
        import { style } from '@vanilla-extract/css';
        export const base = style({ margin: 0 });
        "#,
    );
    let mut vex = vex_for(&dir);
    let summary = vex.process_files(|_| {}).unwrap();
    assert!(summary.errors.is_empty());

    let js = read_out(&dir, "components/button/button.css.js");
    assert!(js.contains("import '../../shared.css.ts.vanilla.css';"));
    assert!(js.contains("import './button.css.ts.vanilla.css';"));
}
