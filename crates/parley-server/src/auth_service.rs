//! `Authentication` service: Signup, Finalise, Token.
//!
//! Signup is the only unauthenticated write in the proxy, so it
//! validates before it touches storage: a rejected password must
//! leave no trace. Finalise and Token share one credential sequence
//! (presence, user existence, password, TOTP) whose failures collapse
//! to coarse errors so callers cannot enumerate accounts.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use parley_crypto::{password, totp};
use parley_proto::authentication_server::Authentication;
use parley_proto::{Auth, SignupRequest, SignupResponse, TokenValue};
use parley_store::Repository;
use parley_types::{ParleyError, Result, User};

use crate::errors::{internal, to_status};
use crate::Core;

/// Accepted password length in Unicode scalar values.
const PASSWORD_MIN: usize = 16;
const PASSWORD_MAX: usize = 64;

pub struct AuthService<R> {
    core: Arc<Core<R>>,
}

impl<R> AuthService<R> {
    pub fn new(core: Arc<Core<R>>) -> Self {
        Self { core }
    }
}

#[tonic::async_trait]
impl<R: Repository> Authentication for AuthService<R> {
    /// Creates an unfinalised user and returns its minted identity
    /// and TOTP seed.
    async fn signup(
        &self,
        request: Request<SignupRequest>,
    ) -> std::result::Result<Response<SignupResponse>, Status> {
        let req = request.into_inner();

        let length = req.password.chars().count();
        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&length) {
            return Err(to_status(ParleyError::PasswordPolicy));
        }

        let id = self
            .core
            .minter
            .mint_id(&self.core.probe())
            .await
            .map_err(to_status)?;

        let seed = totp::generate_seed();
        let hash = password::hash(&req.password).map_err(to_status)?;

        self.core
            .store
            .add_user(&id, &seed, &hash)
            .await
            .map_err(|e| to_status(internal(e)))?;

        tracing::info!(user = %id, "signed up");

        Ok(Response::new(SignupResponse {
            id,
            totp_seed: seed,
        }))
    }

    /// Completes signup by proving the second factor.
    async fn finalise(&self, request: Request<Auth>) -> std::result::Result<Response<()>, Status> {
        let req = request.into_inner();
        self.validate_auth(&req).await.map_err(to_status)?;

        self.core
            .store
            .mark_finalised(&req.user_id)
            .await
            .map_err(|e| to_status(internal(e)))?;

        tracing::info!(user = %req.user_id, "finalised signup");

        Ok(Response::new(()))
    }

    /// Mints a fresh bearer token after full credential validation.
    ///
    /// Overflow past the configured token cap appends rather than
    /// revoking: old tokens stay valid until explicitly deleted.
    async fn token(
        &self,
        request: Request<Auth>,
    ) -> std::result::Result<Response<TokenValue>, Status> {
        let req = request.into_inner();
        let user = self.validate_auth(&req).await.map_err(to_status)?;

        if user.tokens.len() >= self.core.config.max_tokens {
            tracing::warn!(
                user = %req.user_id,
                held = user.tokens.len(),
                cap = self.core.config.max_tokens,
                "token cap exceeded; old tokens are not auto-revoked"
            );
        }

        let value = self.core.minter.mint_token();
        self.core
            .store
            .add_token(&req.user_id, &value)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(TokenValue { value }))
    }
}

impl<R: Repository> AuthService<R> {
    /// The shared credential sequence for Finalise and Token; yields
    /// the validated user record.
    async fn validate_auth(&self, auth: &Auth) -> Result<User> {
        if auth.user_id.is_empty() || auth.password.is_empty() || auth.totp.is_empty() {
            return Err(ParleyError::Input);
        }

        if !self.core.store.id_exists(&auth.user_id).await {
            return Err(ParleyError::BadPassword);
        }

        let user = self
            .core
            .store
            .load_user(&auth.user_id)
            .await
            .map_err(|_| ParleyError::BadPassword)?;

        match password::verify(&auth.password, &user.password_hash) {
            Ok(true) => {}
            _ => return Err(ParleyError::BadPassword),
        }

        match totp::verify(&user.totp_seed, &auth.totp) {
            Ok(true) => Ok(user),
            _ => Err(ParleyError::BadTotp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::peered_core;

    use tonic::Code;

    fn signup_request(password: &str) -> Request<SignupRequest> {
        Request::new(SignupRequest {
            password: password.into(),
        })
    }

    fn auth_request(id: &str, password: &str, code: &str) -> Request<Auth> {
        Request::new(Auth {
            user_id: id.into(),
            password: password.into(),
            totp: code.into(),
        })
    }

    /// Runs a full signup and returns `(id, seed)`.
    async fn signed_up(service: &AuthService<parley_store::memory::MemoryStore>) -> (String, String) {
        let response = service
            .signup(signup_request("a sixteen char pw"))
            .await
            .unwrap()
            .into_inner();
        (response.id, response.totp_seed)
    }

    #[tokio::test]
    async fn short_password_leaves_no_trace() {
        let core = peered_core().await;
        let service = AuthService::new(core.clone());

        let err = service
            .signup(signup_request("too short"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::Unauthenticated);
        assert_eq!(core.store.user_count(), 0);
    }

    #[tokio::test]
    async fn overlong_password_is_rejected() {
        let core = peered_core().await;
        let service = AuthService::new(core.clone());

        let err = service
            .signup(signup_request(&"a".repeat(65)))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::Unauthenticated);
        assert_eq!(core.store.user_count(), 0);
    }

    #[tokio::test]
    async fn sixteen_code_points_suffice() {
        let core = peered_core().await;
        let service = AuthService::new(core.clone());

        // Sixteen scalar values, many more bytes.
        let password = "ü".repeat(16);
        assert!(service.signup(signup_request(&password)).await.is_ok());
    }

    #[tokio::test]
    async fn signup_stores_an_unfinalised_user() {
        let core = peered_core().await;
        let service = AuthService::new(core.clone());

        let (id, seed) = signed_up(&service).await;
        assert!(id.ends_with("@example.com"));
        assert!(!seed.is_empty());

        let user = core.store.load_user(&id).await.unwrap();
        assert!(user.exists());
        assert!(!user.finalised);
        assert!(password::verify("a sixteen char pw", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn finalise_requires_all_fields() {
        let core = peered_core().await;
        let service = AuthService::new(core);

        let err = service
            .finalise(auth_request("", "a sixteen char pw", "123456"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn finalise_with_wrong_password() {
        let core = peered_core().await;
        let service = AuthService::new(core);

        let (id, seed) = signed_up(&service).await;
        let code = totp::current_code(&seed).unwrap();

        let err = service
            .finalise(auth_request(&id, "not the password!", &code))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
        assert_eq!(err.message(), ParleyError::BadPassword.to_string());
    }

    #[tokio::test]
    async fn finalise_with_wrong_code() {
        let core = peered_core().await;
        let service = AuthService::new(core);

        let (id, _seed) = signed_up(&service).await;

        let err = service
            .finalise(auth_request(&id, "a sixteen char pw", "000000"))
            .await
            .unwrap_err();
        assert_eq!(err.message(), ParleyError::BadTotp.to_string());
    }

    #[tokio::test]
    async fn finalise_marks_the_user() {
        let core = peered_core().await;
        let service = AuthService::new(core.clone());

        let (id, seed) = signed_up(&service).await;
        let code = totp::current_code(&seed).unwrap();

        service
            .finalise(auth_request(&id, "a sixteen char pw", &code))
            .await
            .unwrap();

        assert!(core.store.load_user(&id).await.unwrap().finalised);
    }

    #[tokio::test]
    async fn token_mints_and_indexes() {
        let core = peered_core().await;
        let service = AuthService::new(core.clone());

        let (id, seed) = signed_up(&service).await;
        let code = totp::current_code(&seed).unwrap();
        service
            .finalise(auth_request(&id, "a sixteen char pw", &code))
            .await
            .unwrap();

        let code = totp::current_code(&seed).unwrap();
        let token = service
            .token(auth_request(&id, "a sixteen char pw", &code))
            .await
            .unwrap()
            .into_inner()
            .value;

        assert!(token.starts_with("parley-"));
        assert_eq!(core.store.user_id_by_token(&token).await.unwrap(), id);

        // The minted token authenticates.
        let operator = core
            .authenticate(&crate::testutil::bearer(&token))
            .await
            .unwrap();
        assert_eq!(operator.id, id);
    }

    #[tokio::test]
    async fn unknown_user_reads_as_bad_password() {
        let core = peered_core().await;
        let service = AuthService::new(core);

        let err = service
            .token(auth_request(
                "nobody@example.com",
                "a sixteen char pw",
                "123456",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.message(), ParleyError::BadPassword.to_string());
    }
}
