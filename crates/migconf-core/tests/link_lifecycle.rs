mod common;

use chrono::Duration;
use common::*;
use migconf_core::errors::CoreError;
use migconf_core::link;

#[test]
fn regeneration_invalidates_the_old_token() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    let conf = engine.create_conference(new_conference(client_figures()), t0())?;
    let old = conf.link_token.clone();

    assert_eq!(link::resolve(&store, &old, t0())?.id, "conf-1");

    let later = t0() + Duration::days(2);
    let grant = engine.regenerate_link("conf-1", later)?;
    assert_ne!(grant.token, old);
    assert_eq!(grant.expires_at, later + Duration::days(7));

    assert!(matches!(
        link::resolve(&store, &old, later),
        Err(CoreError::LinkNotFound)
    ));
    assert_eq!(link::resolve(&store, &grant.token, later)?.id, "conf-1");
    Ok(())
}

#[test]
fn expired_links_look_like_unknown_ones_publicly() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    let conf = engine.create_conference(new_conference(client_figures()), t0())?;

    let at_expiry = conf.link_expires_at;
    assert!(matches!(
        link::resolve(&store, &conf.link_token, at_expiry),
        Err(CoreError::LinkExpired)
    ));
    assert!(matches!(
        link::resolve_public(&store, &conf.link_token, at_expiry),
        Err(CoreError::LinkUnavailable)
    ));
    assert!(matches!(
        link::resolve_public(&store, "deadbeef", t0()),
        Err(CoreError::LinkUnavailable)
    ));
    assert!(link::resolve_public(&store, &conf.link_token, t0()).is_ok());
    Ok(())
}
