use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

const NODEINFO_TIMEOUT: Duration = Duration::from_secs(5);

const KNOWN_SOFTWARE: &[&str] = &[
    "mastodon",
    "misskey",
    "pleroma",
    "akkoma",
    "calckey",
    "firefish",
    "gotosocial",
    "pixelfed",
    "lemmy",
    "kbin",
    "peertube",
    "friendica",
    "hubzilla",
    "diaspora",
    "gnusocial",
    "sharkey",
    "iceshrimp",
    "foundkey",
    "cherrypick",
];

#[derive(Debug, Deserialize)]
struct WellKnownNodeInfo {
    links: Vec<WellKnownLink>,
}

#[derive(Debug, Deserialize)]
struct WellKnownLink {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct NodeInfoDocument {
    software: NodeInfoSoftware,
}

#[derive(Debug, Deserialize)]
struct NodeInfoSoftware {
    name: String,
}

/// Probes `domain`'s `.well-known/nodeinfo` document and checks whether its
/// declared software is a known ActivityPub implementation. Any network or
/// parse failure is treated as "not a Fediverse server" rather than
/// propagated — this is a best-effort classification used to skip
/// extracting "facts" out of a peer's own server-internal links.
#[instrument(skip(client))]
pub async fn is_fediverse_server(client: &Client, domain: &str) -> bool {
    match probe(client, domain).await {
        Ok(known) => known,
        Err(_) => false,
    }
}

async fn probe(client: &Client, domain: &str) -> reqwest::Result<bool> {
    let well_known_url = format!("https://{domain}/.well-known/nodeinfo");
    let well_known: WellKnownNodeInfo = client
        .get(&well_known_url)
        .timeout(NODEINFO_TIMEOUT)
        .send()
        .await?
        .json()
        .await?;

    let nodeinfo_href = well_known
        .links
        .iter()
        .find(|l| l.rel.contains("ns/schema/2."))
        .map(|l| l.href.clone());

    let Some(href) = nodeinfo_href else {
        return Ok(false);
    };

    let doc: NodeInfoDocument = client
        .get(&href)
        .timeout(NODEINFO_TIMEOUT)
        .send()
        .await?
        .json()
        .await?;

    let name = doc.software.name.to_lowercase();
    Ok(KNOWN_SOFTWARE.contains(&name.as_str()))
}
