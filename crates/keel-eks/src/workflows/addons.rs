//! Managed addon upgrades following a control plane version change

use tracing::info;

use keel_common::Result;
use keel_workflow::WorkflowContext;

use crate::activities::{
    select_addon_version, submit_addon_update, wait_update_completion, AddonUpdateInput, Context,
    WaitUpdateInput,
};
use crate::cloud::CloudTarget;

/// Bring every configured addon to the newest version compatible with
/// `cluster_version`
///
/// Addons run one after another. Activity names include the addon so a run
/// resumed under a different addon list fails replay instead of mixing up
/// recorded outputs.
pub async fn update_addons(
    wctx: &WorkflowContext,
    ctx: &Context,
    target: &CloudTarget,
    cluster_name: &str,
    cluster_version: &str,
) -> Result<Vec<String>> {
    let policies = &ctx.config.retry;
    let mut updated = Vec::new();

    for addon in &ctx.config.managed_addons {
        let addon = addon.as_str();
        let selected: Option<String> = wctx
            .execute_activity(
                &format!("select-addon-version:{addon}"),
                &policies.update_addon,
                |_| select_addon_version(ctx, target, cluster_name, addon, cluster_version),
            )
            .await?;
        let Some(version) = selected else {
            continue;
        };

        let input = &AddonUpdateInput {
            target: target.clone(),
            cluster_name: cluster_name.to_string(),
            addon: addon.to_string(),
            version: version.clone(),
        };
        let update_id: String = wctx
            .execute_activity(
                &format!("submit-addon-update:{addon}"),
                &policies.update_addon,
                |actx| async move { submit_addon_update(ctx, &actx, input).await },
            )
            .await?;

        let wait = &WaitUpdateInput {
            target: target.clone(),
            cluster_name: cluster_name.to_string(),
            update_id,
            addon: Some(addon.to_string()),
        };
        wctx.execute_activity(
            &format!("wait-addon-update:{addon}"),
            &policies.wait_update,
            |actx| async move { wait_update_completion(ctx, &actx, wait).await },
        )
        .await?;

        info!(cluster = %cluster_name, addon = %addon, version = %version, "addon updated");
        updated.push(addon.to_string());
    }

    Ok(updated)
}
