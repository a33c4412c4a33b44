use alloy::primitives::{B256, U256};
use assert_matches::assert_matches;
use rstest::rstest;
use serde_json::json;

use super::common::*;
use crate::error::{ConversionError, ResolutionError};
use crate::functions::LAST_SALT_KEY;
use crate::signer::{KeyScheme, KeySourceType, PublicKey, Signature, SigningDigest};
use crate::value::{G1Point, G2Point, Record, Value};

fn bls_g1() -> G1Point {
    G1Point::new(U256::from(11), U256::from(12))
}

fn bls_g2() -> G2Point {
    G2Point::new([U256::from(21), U256::from(22)], [U256::from(23), U256::from(24)])
}

#[tokio::test]
async fn array_uint8_splits_configured_list() {
    let mut controller =
        TestContext::new().with_config("quorums", json!("0, 1,2")).controller(specification(json!({}), json!([])));

    let value = controller.load("func:array_uint8(list=config:quorums)", None, true).await.unwrap();
    assert_eq!(value, Value::Array(vec![Value::Uint(U256::ZERO), Value::Uint(U256::from(1)), Value::Uint(U256::from(2))]));
}

#[tokio::test]
async fn array_uint8_rejects_out_of_range_items() {
    let mut controller =
        TestContext::new().with_config("quorums", json!("1,256")).controller(specification(json!({}), json!([])));

    let err = controller.load("func:array_uint8(list=config:quorums)", None, true).await.unwrap_err();
    assert_matches!(err.root_resolution_error(), Some(ResolutionError::Conversion(ConversionError::Parse { .. })));
}

#[rstest]
#[case::missing_timeout("func:expiry()")]
#[case::missing_file("func:ecdsa_public_key(format=const:address)")]
#[tokio::test]
async fn missing_required_parameter_names_the_function(#[case] key: &str) {
    let mut controller = TestContext::new().controller(specification(json!({}), json!([])));

    let err = controller.load(key, None, true).await.unwrap_err();
    assert_matches!(err.root_resolution_error(), Some(ResolutionError::MissingParameter { .. }));
}

#[rstest]
#[case::unknown("func:rsa_sign(file=const:key)", "invalid function")]
#[case::malformed("func:expiry(const:300)", "malformed function parameter")]
#[tokio::test]
async fn registry_syntax_errors(#[case] key: &str, #[case] expected: &str) {
    let mut controller = TestContext::new().controller(specification(json!({}), json!([])));

    let err = controller.load(key, None, true).await.unwrap_err();
    assert!(err.to_string().contains(expected), "{err}");
}

#[tokio::test]
async fn salt_is_memoized_as_32_bytes() {
    let mut controller = TestContext::new().controller(specification(json!({}), json!([])));

    let salt = controller.load("func:salt(seed=const:operator)", None, true).await.unwrap();
    assert_matches!(&salt, Value::Bytes(bytes) if bytes.len() == 32);
    assert_eq!(controller.cache().get(LAST_SALT_KEY), Some(&salt));
    assert_eq!(controller.load(LAST_SALT_KEY, None, true).await.unwrap(), salt);
}

#[rstest]
#[case::default("", Value::Address(OPERATOR))]
#[case::address(",format=const:address", Value::Address(OPERATOR))]
#[case::hex(",format=const:hex", Value::String(OPERATOR.to_string()))]
#[case::bytes(",format=const:bytes", Value::Bytes(OPERATOR.to_vec()))]
#[tokio::test]
async fn ecdsa_public_key_formats(#[case] format: &str, #[case] expected: Value) {
    let mut context = TestContext::new();
    context
        .signer
        .expect_public_key()
        .withf(|key| key.scheme == KeyScheme::Ecdsa && key.source == KeySourceType::Local && key.password.is_empty())
        .times(1)
        .returning(|_| Ok(PublicKey::Ecdsa { address: OPERATOR }));
    let mut controller = context.controller(specification(json!({}), json!([])));

    let key = format!("func:ecdsa_public_key(type=const:keystore,file=const:/keys/operator.ecdsa.json{format})");
    assert_eq!(controller.load(&key, None, true).await.unwrap(), expected);
}

#[tokio::test]
async fn unknown_key_format_is_an_invalid_parameter() {
    let mut context = TestContext::new();
    context.signer.expect_public_key().returning(|_| Ok(PublicKey::Bls { g1: bls_g1(), g2: bls_g2() }));
    let mut controller = context.controller(specification(json!({}), json!([])));

    let err = controller
        .load("func:bls_public_key(file=const:/keys/operator.bls.json,format=const:compressed)", None, true)
        .await
        .unwrap_err();
    assert_matches!(
        err.root_resolution_error(),
        Some(ResolutionError::InvalidParameter { parameter, .. }) if parameter == "format"
    );
}

#[tokio::test]
async fn bls_curve_sign_projects_through_struct_transform() {
    let mut context = TestContext::new();
    context
        .signer
        .expect_sign()
        .withf(|key, digest| key.scheme == KeyScheme::Bls && *digest == SigningDigest::G1(G1Point::ZERO))
        .times(1)
        .returning(|_, _| Ok(Signature::Bls(G1Point::new(U256::from(1), U256::from(2)))));
    context.signer.expect_public_key().times(1).returning(|_| Ok(PublicKey::Bls { g1: bls_g1(), g2: bls_g2() }));
    let mut controller = context.controller(specification(json!({}), json!([])));

    let value = controller
        .load(
            "func:bls_curve_sign(file=const:/keys/operator.bls.json,password=const:pw,digest=func:g1_zero())\
             ->struct(sigma:signature,apk:pubkeyG2)",
            None,
            true,
        )
        .await
        .unwrap();

    let expected = Record::from_fields(vec![
        ("sigma".to_string(), Value::G1(G1Point::new(U256::from(1), U256::from(2)))),
        ("apk".to_string(), Value::G2(bls_g2())),
    ]);
    assert_eq!(value, Value::Record(expected));
}

#[tokio::test]
async fn bls_sign_packs_signature_and_keeps_expiry() {
    let mut context = TestContext::new();
    context
        .signer
        .expect_sign()
        .withf(|_, digest| *digest == SigningDigest::Hash(B256::repeat_byte(0x07)))
        .returning(|_, _| Ok(Signature::Bls(G1Point::new(U256::from(1), U256::from(2)))));
    let mut controller = context.controller(specification(json!({}), json!([])));

    let digest = format!("const:{}", B256::repeat_byte(0x07));
    let key = format!("func:bls_sign(file=const:/keys/operator.bls.json,expiry=const:99,digest={digest})");
    let value = controller.load(&key, None, true).await.unwrap();

    let mut signature = U256::from(1).to_be_bytes::<32>().to_vec();
    signature.extend_from_slice(&U256::from(2).to_be_bytes::<32>());
    let expected = Record::from_fields(vec![
        ("signature".to_string(), Value::Bytes(signature)),
        ("expiry".to_string(), Value::Uint(U256::from(99))),
    ]);
    assert_eq!(value, Value::Record(expected));
}

#[tokio::test]
async fn curve_constants_need_no_collaborators() {
    let mut controller = TestContext::new().controller(specification(json!({}), json!([])));

    assert_eq!(controller.load("func:g1_zero()", None, true).await.unwrap(), Value::G1(G1Point::ZERO));
    assert_eq!(controller.load("func:g2_zero()", None, true).await.unwrap(), Value::G2(G2Point::ZERO));
}
