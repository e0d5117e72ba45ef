use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::SecretString;
use tokio::sync::mpsc;

use accounts_wizard::accounts::{
    AccountStore, MemoryAccountStore, ParamKind, ParamSpec, ParamValue, Parameters, ProfilePolicy,
    ProtocolInfo, ServiceProfile,
};
use accounts_wizard::config::WizardConfig;
use accounts_wizard::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use accounts_wizard::coordinator::ConnectionAttemptCoordinator;
use accounts_wizard::fields::{
    DisplayNameField, EnabledField, EntryValidation, FieldComponent, ParamIntField,
    ParamStringField, UsernameField,
};
use accounts_wizard::manager::LoopbackManager;
use accounts_wizard::presenter::CliPresenter;
use accounts_wizard::wizard::{FinishOutcome, WizardDeps, WizardEvent, WizardStepController};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = WizardConfig::from_env().context("invalid wizard configuration")?;

    eprintln!("🔑 Accounts Wizard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Connect timeout: {}s", config.connect_timeout.as_secs());
    eprintln!("   Demo login: demo@example.org / secret");
    eprintln!("   Type q to quit.\n");

    // ── Connectivity ────────────────────────────────────────────────────
    let connectivity = ConnectivityMonitor::new();
    let (bearer_tx, bearer_rx) = mpsc::channel(8);
    let _pump = connectivity.spawn_event_pump(bearer_rx);
    bearer_tx
        .send(ConnectivityEvent::up("wlan0"))
        .await
        .context("connectivity pump stopped")?;

    // ── Connection manager ──────────────────────────────────────────────
    let manager = LoopbackManager::new(["jabber", "sip"], Duration::from_secs(2));
    manager
        .add_credentials("demo@example.org", SecretString::from("secret"))
        .await;

    let store: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
    let presenter = Arc::new(CliPresenter::new());
    let coordinator = ConnectionAttemptCoordinator::new(
        manager.clone(),
        Arc::clone(&connectivity),
        config.connect_timeout,
    );

    let deps = WizardDeps {
        catalog: demo_catalog().context("invalid demo catalog")?,
        store: Arc::clone(&store),
        coordinator,
        presenter: presenter.clone(),
        policy: Arc::new(ProfilePolicy::new(config.single_account_default)),
        config: config.clone(),
    };

    // ── Interactive loop ────────────────────────────────────────────────
    loop {
        let mut wizard = WizardStepController::new_account(deps.clone(), None)?;
        let mut events = wizard.subscribe();

        for (i, service) in wizard.services().iter().enumerate() {
            eprintln!("  {}. {}", i + 1, service.display_name);
        }
        let Some(choice) = presenter.read_line("Service: ").await else {
            break;
        };
        if choice == "q" {
            break;
        }
        let name = choice
            .parse::<usize>()
            .ok()
            .and_then(|n| wizard.services().get(n.wrapping_sub(1)).map(|s| s.name.clone()))
            .unwrap_or(choice);
        if let Err(e) = wizard.select_service(&name).await {
            eprintln!("❌ {e}");
            continue;
        }

        // Fill in the page until the save goes through or the user gives up.
        'page: loop {
            let labels: Vec<(String, String, String)> = wizard
                .page()
                .map(|page| {
                    page.fields()
                        .iter()
                        .map(|f| (f.name().to_string(), f.label().to_string(), f.display_value()))
                        .collect()
                })
                .unwrap_or_default();

            for (field, label, current) in labels {
                let prompt = if current.is_empty() {
                    format!("{label}: ")
                } else {
                    format!("{label} [{current}]: ")
                };
                let Some(input) = presenter.read_line(&prompt).await else {
                    wizard.cancel().await;
                    return Ok(());
                };
                if input.is_empty() {
                    continue;
                }
                if let Some(page) = wizard.page_mut()
                    && let Err(e) = page.set_input(&field, &input)
                {
                    eprintln!("⚠️  {e}");
                }
            }

            eprintln!("→ {}", wizard.action_label());
            match wizard.finish().await {
                Ok(FinishOutcome::OperationAsync) => {}
                Ok(outcome) => {
                    tracing::debug!(?outcome, "Finish did not start an operation");
                    continue 'page;
                }
                Err(_) => continue 'page,
            }

            while let Ok(event) = events.recv().await {
                tracing::debug!(event = %serde_json::to_string(&event)?, "Wizard event");
                if let WizardEvent::OperationCompleted { error, .. } = event {
                    if error.is_none() {
                        break 'page;
                    }
                    break;
                }
            }

            let retry = presenter.read_line("Try again? [Y/n] ").await;
            if matches!(retry.as_deref(), Some("n" | "N" | "no") | None) {
                wizard.cancel().await;
                break 'page;
            }
        }
        wizard.wait_for_operation().await;

        for account in store.list_accounts().await? {
            eprintln!(
                "   • {} ({}) {}",
                account.account_name(),
                account.service,
                if account.has_been_online { "online" } else { "draft" }
            );
        }
    }

    eprintln!("Goodbye!");
    Ok(())
}

fn demo_catalog() -> anyhow::Result<Vec<ServiceProfile>> {
    let jabber = ProtocolInfo {
        manager: "loopback".into(),
        name: "jabber".into(),
        params: vec![
            ParamSpec::new("account", ParamKind::Str),
            ParamSpec::new("password", ParamKind::Str).secret(),
            ParamSpec::new("server", ParamKind::Str),
            ParamSpec::new("port", ParamKind::UInt).with_default(ParamValue::UInt(5222)),
        ],
    };
    let sip = ProtocolInfo {
        manager: "loopback".into(),
        name: "sip".into(),
        params: vec![
            ParamSpec::new("account", ParamKind::Str),
            ParamSpec::new("password", ParamKind::Str).secret(),
            ParamSpec::new("server", ParamKind::Str)
                .with_default(ParamValue::Str("sip.example.org".into())),
        ],
    };

    let username_rules = EntryValidation::new()
        .length(1, Some(64))
        .invalid_chars(r"[/:]")?;

    Ok(vec![
        ServiceProfile {
            name: "jabber".into(),
            display_name: "Jabber".into(),
            icon_name: Some("im-jabber".into()),
            priority: 0,
            protocol: jabber,
            successful_message: None,
            single_account: None,
            preset_params: Parameters::new(),
            fields: vec![
                UsernameField::new("User name")
                    .must_have_at()
                    .with_validation(username_rules.clone())
                    .into(),
                ParamStringField::new("password", "Password")
                    .required()
                    .secret()
                    .into(),
                ParamIntField::new("port", "Port", ParamKind::UInt)
                    .with_range(1, 65535)
                    .into(),
                DisplayNameField::new().into(),
                EnabledField::new().into(),
            ],
        },
        ServiceProfile {
            name: "sip".into(),
            display_name: "SIP".into(),
            icon_name: Some("im-sip".into()),
            priority: 10,
            protocol: sip,
            successful_message: Some("You can now make calls as {account}.".into()),
            single_account: Some(true),
            preset_params: Parameters::new(),
            fields: vec![
                UsernameField::new("User name")
                    .with_validation(username_rules)
                    .into(),
                ParamStringField::new("password", "Password")
                    .required()
                    .secret()
                    .into(),
                EnabledField::new().into(),
            ],
        },
    ])
}
