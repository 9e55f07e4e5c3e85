use crate::config::Settings;
use crate::directory::{
    DirectoryClient, DiscoveryFilter, ResourceType, NET_CREATE_CHILD, NET_DELETE_CHILD,
};
use crate::errors::{Error, Result};
use tracing::info;

/// Makes sure the dashboard's ACP, AE and CSE-level subscription exist.
///
/// Unlike the tolerant intents used while mirroring, any failure here is
/// returned: without its own registration the dashboard never receives
/// notifications.
pub async fn register(client: &DirectoryClient, settings: &Settings) -> Result<()> {
    let acp_name = settings.acp_name();
    let acps = client
        .try_discover(
            &DiscoveryFilter::at(settings.cse_id.as_str())
                .of_type(ResourceType::AccessControlPolicy)
                .name(acp_name.as_str()),
        )
        .await?;
    if acps.is_empty() {
        info!("Creating access control policy {}", acp_name);
        let admin = client.with_originator(settings.admin_originator.as_str());
        created(
            admin
                .create_notification_acp(&settings.cse_id, &acp_name, client.originator())
                .await,
            &acp_name,
        )?;
    }

    let aes = client
        .try_discover(
            &DiscoveryFilter::at(settings.cse_id.as_str())
                .of_type(ResourceType::ApplicationEntity)
                .name(settings.app_name.as_str()),
        )
        .await?;
    if aes.is_empty() {
        info!("Creating application entity {}", settings.app_name);
        let acp = settings.cse_child(&acp_name);
        let point_of_access = settings.point_of_access();
        created(
            client
                .create_ae(
                    &settings.cse_id,
                    &settings.app_name,
                    &[],
                    Some(point_of_access.as_str()),
                    Some(acp.as_str()),
                )
                .await,
            &settings.app_name,
        )?;
    }

    let subscription = settings.subscription_name();
    created(
        client
            .create_subscription(
                &settings.cse_id,
                &subscription,
                &[NET_CREATE_CHILD, NET_DELETE_CHILD],
            )
            .await,
        &subscription,
    )?;

    info!(
        "Registered as {} with notifications at {}",
        client.originator(),
        settings.point_of_access()
    );
    Ok(())
}

/// A conflict means the resource survived a previous run.
fn created(result: Result<String>, name: &str) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_conflict() => {
            info!("{} already exists", name);
            Ok(())
        }
        Err(e) => Err(Error::Registration(format!("{}: {}", name, e))),
    }
}
