use jwt_simple::prelude::*;

use crate::User;

const JWT_DURATION: u64 = 60 * 60 * 24 * 7;
const JWT_IMPERSONATION_DURATION: u64 = 60 * 60;
const JWT_ISS: &str = "tutor_server";
const JWT_AUD: &str = "tutor_web";

pub struct EncodingKey(Ed25519KeyPair);

pub struct DecodingKey(Ed25519PublicKey);

impl EncodingKey {
    pub fn load(pem: &str) -> Result<Self, jwt_simple::Error> {
        Ok(Self(Ed25519KeyPair::from_pem(pem)?))
    }

    /// Sign a regular session for `user`. Any impersonation marker on the
    /// input is dropped.
    pub fn sign(&self, user: impl Into<User>) -> Result<String, jwt_simple::Error> {
        let mut user = user.into();
        user.impersonated_by = None;
        self.sign_claims(user, JWT_DURATION)
    }

    /// Sign a short-lived session that acts as `target` on behalf of `admin_id`.
    pub fn sign_impersonation(
        &self,
        target: impl Into<User>,
        admin_id: i64,
    ) -> Result<String, jwt_simple::Error> {
        let mut user = target.into();
        user.impersonated_by = Some(admin_id);
        self.sign_claims(user, JWT_IMPERSONATION_DURATION)
    }

    fn sign_claims(&self, user: User, secs: u64) -> Result<String, jwt_simple::Error> {
        let claims = Claims::with_custom_claims(user, Duration::from_secs(secs));
        let claims = claims.with_issuer(JWT_ISS).with_audience(JWT_AUD);
        self.0.sign(claims)
    }
}

impl DecodingKey {
    pub fn load(pem: &str) -> Result<Self, jwt_simple::Error> {
        Ok(Self(Ed25519PublicKey::from_pem(pem)?))
    }

    pub fn verify(&self, token: &str) -> Result<User, jwt_simple::Error> {
        let opts = VerificationOptions {
            allowed_issuers: Some(HashSet::from_strings(&[JWT_ISS])),
            allowed_audiences: Some(HashSet::from_strings(&[JWT_AUD])),
            ..Default::default()
        };
        let claims = self.0.verify_token::<User>(token, Some(opts))?;
        Ok(claims.custom)
    }
}
