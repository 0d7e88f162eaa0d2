//! Connected payment-account onboarding and health.

use common::MerchantId;
use session_store::GuaranteeStore;

use crate::error::{LifecycleError, Result};
use crate::services::payment::PaymentGateway;

/// Outcome of a connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The account is fully onboarded and charge-capable.
    AlreadyConnected { account_id: String },

    /// The merchant must follow this link to finish onboarding.
    OnboardingLink { account_id: String, url: String },
}

/// Connection state reported to the merchant dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    /// No usable connected account.
    Disconnected,

    /// Account exists; capability flags as last probed.
    Connected {
        details_submitted: bool,
        charges_enabled: bool,
        payouts_enabled: bool,
    },
}

/// Onboards and heals merchant connected accounts.
pub struct AccountManager<S, P>
where
    S: GuaranteeStore,
    P: PaymentGateway,
{
    store: S,
    gateway: P,
}

impl<S, P> AccountManager<S, P>
where
    S: GuaranteeStore,
    P: PaymentGateway,
{
    /// Creates a new account manager.
    pub fn new(store: S, gateway: P) -> Self {
        Self { store, gateway }
    }

    /// Creates or reuses a connected account and returns the next step.
    ///
    /// A stored account that no longer probes successfully is treated as
    /// stale: it is cleared and replaced with a fresh account rather than
    /// failing the merchant's request.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&self, merchant_id: MerchantId) -> Result<ConnectOutcome> {
        let mut config = self
            .store
            .config_for_merchant(merchant_id)
            .await?
            .ok_or(LifecycleError::ConfigNotFound)?;

        if let Some(account_id) = config.connected_account_id.clone() {
            match self.gateway.account_status(&account_id).await {
                Ok(capabilities) => {
                    config.account_charges_enabled = capabilities.charges_enabled;
                    self.store.upsert_config(config).await?;

                    if capabilities.is_complete() {
                        return Ok(ConnectOutcome::AlreadyConnected { account_id });
                    }

                    // Onboarding was started but never finished: reuse the
                    // same account with a fresh link.
                    let url = self.gateway.onboarding_link(&account_id).await?;
                    return Ok(ConnectOutcome::OnboardingLink { account_id, url });
                }
                Err(e) => {
                    tracing::warn!(
                        %merchant_id,
                        account_id,
                        error = %e,
                        "stored account failed probe, creating a replacement"
                    );
                    config.connected_account_id = None;
                    config.account_charges_enabled = false;
                }
            }
        }

        let account_id = self
            .gateway
            .create_account(config.business_email.as_deref())
            .await?;
        let url = self.gateway.onboarding_link(&account_id).await?;

        config.connected_account_id = Some(account_id.clone());
        config.account_charges_enabled = false;
        self.store.upsert_config(config).await?;

        Ok(ConnectOutcome::OnboardingLink { account_id, url })
    }

    /// Probes the connected account and refreshes the capability snapshot.
    #[tracing::instrument(skip(self))]
    pub async fn status(&self, merchant_id: MerchantId) -> Result<AccountState> {
        let mut config = self
            .store
            .config_for_merchant(merchant_id)
            .await?
            .ok_or(LifecycleError::ConfigNotFound)?;

        let Some(account_id) = config.connected_account_id.clone() else {
            return Ok(AccountState::Disconnected);
        };

        match self.gateway.account_status(&account_id).await {
            Ok(capabilities) => {
                if config.account_charges_enabled != capabilities.charges_enabled {
                    config.account_charges_enabled = capabilities.charges_enabled;
                    self.store.upsert_config(config).await?;
                }
                Ok(AccountState::Connected {
                    details_submitted: capabilities.details_submitted,
                    charges_enabled: capabilities.charges_enabled,
                    payouts_enabled: capabilities.payouts_enabled,
                })
            }
            Err(e) => {
                // Read path stays read-only; connect() does the healing.
                tracing::warn!(%merchant_id, account_id, error = %e, "account probe failed");
                Ok(AccountState::Disconnected)
            }
        }
    }

    /// Clears the connected account and force-disables the guarantee.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self, merchant_id: MerchantId) -> Result<()> {
        let mut config = self
            .store
            .config_for_merchant(merchant_id)
            .await?
            .ok_or(LifecycleError::ConfigNotFound)?;

        config.connected_account_id = None;
        config.account_charges_enabled = false;
        // A guarantee with no account to charge on is a lie; switch it off.
        config.enabled = false;
        self.store.upsert_config(config).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payment::{AccountCapabilities, InMemoryPaymentGateway};
    use domain::GuaranteeConfig;
    use session_store::InMemorySessionStore;

    async fn setup(
        account: Option<&str>,
    ) -> (
        AccountManager<InMemorySessionStore, InMemoryPaymentGateway>,
        InMemorySessionStore,
        InMemoryPaymentGateway,
        MerchantId,
    ) {
        let store = InMemorySessionStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let merchant_id = MerchantId::new();

        let mut config = GuaranteeConfig::new(merchant_id, "Chez Test");
        config.enabled = true;
        if let Some(account_id) = account {
            config.connected_account_id = Some(account_id.to_string());
        }
        store.upsert_config(config).await.unwrap();

        let manager = AccountManager::new(store.clone(), gateway.clone());
        (manager, store, gateway, merchant_id)
    }

    #[tokio::test]
    async fn test_connect_creates_account_and_link() {
        let (manager, store, _, merchant_id) = setup(None).await;

        let outcome = manager.connect(merchant_id).await.unwrap();
        let ConnectOutcome::OnboardingLink { account_id, url } = outcome else {
            panic!("expected onboarding link");
        };
        assert!(url.contains(&account_id));

        let config = store
            .config_for_merchant(merchant_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(config.connected_account_id, Some(account_id));
        assert!(!config.account_charges_enabled);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_when_complete() {
        let (manager, store, gateway, merchant_id) = setup(Some("acct_ready")).await;
        gateway.seed_ready_account("acct_ready");

        let outcome = manager.connect(merchant_id).await.unwrap();
        assert_eq!(
            outcome,
            ConnectOutcome::AlreadyConnected {
                account_id: "acct_ready".to_string()
            }
        );

        let config = store
            .config_for_merchant(merchant_id)
            .await
            .unwrap()
            .unwrap();
        assert!(config.account_charges_enabled);
    }

    #[tokio::test]
    async fn test_connect_reissues_link_for_incomplete_account() {
        let (manager, _, gateway, merchant_id) = setup(Some("acct_half")).await;
        gateway.set_capabilities("acct_half", AccountCapabilities::default());

        let outcome = manager.connect(merchant_id).await.unwrap();
        let ConnectOutcome::OnboardingLink { account_id, .. } = outcome else {
            panic!("expected onboarding link");
        };
        assert_eq!(account_id, "acct_half");
    }

    #[tokio::test]
    async fn test_connect_replaces_stale_account() {
        let (manager, store, _, merchant_id) = setup(Some("acct_gone")).await;

        let outcome = manager.connect(merchant_id).await.unwrap();
        let ConnectOutcome::OnboardingLink { account_id, .. } = outcome else {
            panic!("expected onboarding link");
        };
        assert_ne!(account_id, "acct_gone");

        let config = store
            .config_for_merchant(merchant_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(config.connected_account_id, Some(account_id));
    }

    #[tokio::test]
    async fn test_status_refreshes_snapshot() {
        let (manager, store, gateway, merchant_id) = setup(Some("acct_1")).await;
        gateway.seed_ready_account("acct_1");

        let state = manager.status(merchant_id).await.unwrap();
        assert_eq!(
            state,
            AccountState::Connected {
                details_submitted: true,
                charges_enabled: true,
                payouts_enabled: true,
            }
        );

        let config = store
            .config_for_merchant(merchant_id)
            .await
            .unwrap()
            .unwrap();
        assert!(config.account_charges_enabled);
    }

    #[tokio::test]
    async fn test_status_without_account() {
        let (manager, _, _, merchant_id) = setup(None).await;
        assert_eq!(
            manager.status(merchant_id).await.unwrap(),
            AccountState::Disconnected
        );
    }

    #[tokio::test]
    async fn test_disconnect_force_disables() {
        let (manager, store, gateway, merchant_id) = setup(Some("acct_1")).await;
        gateway.seed_ready_account("acct_1");

        manager.disconnect(merchant_id).await.unwrap();

        let config = store
            .config_for_merchant(merchant_id)
            .await
            .unwrap()
            .unwrap();
        assert!(config.connected_account_id.is_none());
        assert!(!config.enabled);
        assert!(!config.account_charges_enabled);
    }
}
