use crate::models::launch::{EcosystemDocument, LaunchError, LaunchProfile};

/// 未设置 cwd 时以 `__dirname` 表达式输出，即配置文件所在的仓库根目录
const DIRNAME_EXPR: &str = "__dirname";

/// 渲染进程管理器使用的 ecosystem.config.js
pub fn render_ecosystem(profile: &LaunchProfile) -> Result<String, LaunchError> {
    profile.validate()?;

    let mut app = profile.clone();
    let bare_dirname = app.cwd.is_none();
    if bare_dirname {
        app.cwd = Some(DIRNAME_EXPR.to_string());
    }

    let doc = EcosystemDocument { apps: vec![app] };
    let mut body = serde_json::to_string_pretty(&doc)?;
    if bare_dirname {
        body = body.replacen(
            &format!("\"cwd\": \"{}\"", DIRNAME_EXPR),
            &format!("\"cwd\": {}", DIRNAME_EXPR),
            1,
        );
    }

    Ok(format!("module.exports = {};\n", body))
}
