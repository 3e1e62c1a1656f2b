//! Embedded EC2 manifest-encryption certificates.
//!
//! Different EC2 partitions decrypt instance-store AMIs with different
//! private keys, so the AES key and IV in a manifest must be wrapped with the
//! matching public key. The certificates ship with `ec2-ami-tools` and do not
//! rotate: the manifest format still carries its 2007 version and has no way
//! to say which EC2 certificate was used. The default certificate nominally
//! expired in 2006 and is still in use; expiry and signatures are not checked
//! here, since the certificates are nothing more than public-key carriers.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::RsaPublicKey;
use x509_cert::der::DecodePem;
use x509_cert::Certificate;

use crate::error::{BundleError, Result};

const CERT_EC2: &str = "-----BEGIN CERTIFICATE-----
MIIDzjCCAzegAwIBAgIJALDnZV+lpZdSMA0GCSqGSIb3DQEBBQUAMIGhMQswCQYD
VQQGEwJaQTEVMBMGA1UECBMMV2VzdGVybiBDYXBlMRIwEAYDVQQHEwlDYXBlIFRv
d24xJzAlBgNVBAoTHkFtYXpvbiBEZXZlbG9wbWVudCBDZW50cmUgKFNBKTEMMAoG
A1UECxMDQUVTMREwDwYDVQQDEwhBRVMgVGVzdDEdMBsGCSqGSIb3DQEJARYOYWVz
QGFtYXpvbi5jb20wHhcNMDUwODA5MTYwMTA5WhcNMDYwODA5MTYwMTA5WjCBoTEL
MAkGA1UEBhMCWkExFTATBgNVBAgTDFdlc3Rlcm4gQ2FwZTESMBAGA1UEBxMJQ2Fw
ZSBUb3duMScwJQYDVQQKEx5BbWF6b24gRGV2ZWxvcG1lbnQgQ2VudHJlIChTQSkx
DDAKBgNVBAsTA0FFUzERMA8GA1UEAxMIQUVTIFRlc3QxHTAbBgkqhkiG9w0BCQEW
DmFlc0BhbWF6b24uY29tMIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQC8v/X5
zZv8CAVfNmvBM0br/RUcf1wU8xC5d2otFQQsQKB3qiWoj3oHeOWskOlTPFVZ8N+/
hEaMjyOUkg2+g6XEagCQtFCEBzUVoMjiQIBPiWj5CWkFtlav2zt33LZ0ErTND4xl
j7FQFqbaytHU9xuQcFO2p12bdITiBs5Kwoi9bQIDAQABo4IBCjCCAQYwHQYDVR0O
BBYEFPQnsX1kDVzPtX+38ACV8RhoYcw8MIHWBgNVHSMEgc4wgcuAFPQnsX1kDVzP
tX+38ACV8RhoYcw8oYGnpIGkMIGhMQswCQYDVQQGEwJaQTEVMBMGA1UECBMMV2Vz
dGVybiBDYXBlMRIwEAYDVQQHEwlDYXBlIFRvd24xJzAlBgNVBAoTHkFtYXpvbiBE
ZXZlbG9wbWVudCBDZW50cmUgKFNBKTEMMAoGA1UECxMDQUVTMREwDwYDVQQDEwhB
RVMgVGVzdDEdMBsGCSqGSIb3DQEJARYOYWVzQGFtYXpvbi5jb22CCQCw52VfpaWX
UjAMBgNVHRMEBTADAQH/MA0GCSqGSIb3DQEBBQUAA4GBAJJlWll4uGlrqBzeIw7u
M3RvomlxMESwGKb9gI+ZeORlnHAyZxvd9XngIcjPuU+8uc3wc10LRQUCn45a5hFs
zaCp9BSewLCCirn6awZn2tP8JlagSbjrN9YShStt8S3S/Jj+eBoRvc7jJnmEeMkx
O0wHOzp5ZHRDK7tGULD6jCfU
-----END CERTIFICATE-----";

const CERT_EC2_GOV: &str = "-----BEGIN CERTIFICATE-----
MIICvzCCAigCCQD3V6lFvX6dzDANBgkqhkiG9w0BAQUFADCBozELMAkGA1UEBhMC
VVMxCzAJBgNVBAgTAldBMRAwDgYDVQQHEwdTZWF0dGxlMRMwEQYDVQQKEwpBbWF6
b24uY29tMRYwFAYDVQQLEw1FQzIgQXV0aG9yaXR5MRowGAYDVQQDExFFQzIgQU1J
IEF1dGhvcml0eTEsMCoGCSqGSIb3DQEJARYdZWMyLWFtaS1nb3Ytd2VzdC0xQGFt
YXpvbi5jb20wHhcNMTEwODEyMTcyNjE1WhcNMjEwODA5MTcyNjE1WjCBozELMAkG
A1UEBhMCVVMxCzAJBgNVBAgTAldBMRAwDgYDVQQHEwdTZWF0dGxlMRMwEQYDVQQK
EwpBbWF6b24uY29tMRYwFAYDVQQLEw1FQzIgQXV0aG9yaXR5MRowGAYDVQQDExFF
QzIgQU1JIEF1dGhvcml0eTEsMCoGCSqGSIb3DQEJARYdZWMyLWFtaS1nb3Ytd2Vz
dC0xQGFtYXpvbi5jb20wgZ8wDQYJKoZIhvcNAQEBBQADgY0AMIGJAoGBANshKnhw
DUZ2/6VJwVTsXMUI1CGd5rpSpSLUCHGuqII+BDUvnp/sPxd1u6+I1QrbaaBAOm6+
evM77M7vNJXY3+JW00VOs9NgPEXBmn6UV4R1P7DljKurWGmRp8Fj1yVU4sSgZqqv
74SyhD0Z4ASczVcOiTZICeuQoJwmeZ8F20oLAgMBAAEwDQYJKoZIhvcNAQEFBQAD
gYEAH3vpkD80ngP1e18UYSVBCODArik+aeUPAzJrPDYorrnffbamks50IMTktyiu
za1JuplrvVsAKcQhyoPOq69bwRDg4L8VOXSCjjvsNuEhHL603h8jn6ghEouPCPl7
8s4Sr5XikmAgwFcPb/frNnLuZsSol08tISgPOlFg4KLv/bo=
-----END CERTIFICATE-----";

const CERT_EC2_CN_NORTH_1: &str = "-----BEGIN CERTIFICATE-----
MIIEwTCCA6mgAwIBAgIJALBg5STuwebSMA0GCSqGSIb3DQEBBQUAMIGbMQswCQYD
VQQGEwJaQTEVMBMGA1UECBMMV2VzdGVybiBDYXBlMRIwEAYDVQQHEwlDYXBlIFRv
d24xHDAaBgNVBAoTE0FtYXpvbiBXZWIgU2VydmljZXMxDDAKBgNVBAsTA0VDMjEW
MBQGA1UEAxMNQU1JIE1hbmlmZXN0czEdMBsGCSqGSIb3DQEJARYOYWVzQGFtYXpv
bi5jb20wHhcNMTMwODI4MTAxNTEwWhcNMTkwMjE4MTAxNTEwWjCBmzELMAkGA1UE
BhMCWkExFTATBgNVBAgTDFdlc3Rlcm4gQ2FwZTESMBAGA1UEBxMJQ2FwZSBUb3du
MRwwGgYDVQQKExNBbWF6b24gV2ViIFNlcnZpY2VzMQwwCgYDVQQLEwNFQzIxFjAU
BgNVBAMTDUFNSSBNYW5pZmVzdHMxHTAbBgkqhkiG9w0BCQEWDmFlc0BhbWF6b24u
Y29tMIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA601VE9anUnkM5weg
THEUqNkT7fwaKKoTM+oV6n0h5D4LF/qY7IuS7YlxP308P00yE6In4ZHHvc1E/X1e
s36t7ojdlx8Pg0jzFLir27BWSl+ddZGJLl0u8FFzJUPmqeiQZW3mKosOqAoj/C5h
svXnSmLGxd619eGz2+Kel38LPhwzA8PZeNhil/eK53oo/h7dZvRUtH2+zbYXxq5Q
2tsRN1Ef4QaNeKHSdupo8eFNUnmSgeEYz1RC/2QDn6MK7uXijOft4G6iEO4c+PeR
wLyBW8YMla2SJk1n4z4gmSJ21uCZ0Bv0A2j/3f+JmgNo4QLIAl/UBWBTT+eSAFYw
LVDlrwIDAQABo4IBBDCCAQAwHQYDVR0OBBYEFJSvQRrRg2O1O/kSOEKH2z18OFfH
MIHQBgNVHSMEgcgwgcWAFJSvQRrRg2O1O/kSOEKH2z18OFfHoYGhpIGeMIGbMQsw
CQYDVQQGEwJaQTEVMBMGA1UECBMMV2VzdGVybiBDYXBlMRIwEAYDVQQHEwlDYXBl
IFRvd24xHDAaBgNVBAoTE0FtYXpvbiBXZWIgU2VydmljZXMxDDAKBgNVBAsTA0VD
MjEWMBQGA1UEAxMNQU1JIE1hbmlmZXN0czEdMBsGCSqGSIb3DQEJARYOYWVzQGFt
YXpvbi5jb22CCQCwYOUk7sHm0jAMBgNVHRMEBTADAQH/MA0GCSqGSIb3DQEBBQUA
A4IBAQACBMJpb8N7cT0PP3u814D1Ngd2vqEv6aB8saklT44kWwAXDcILVtPd09ae
8q1oWSKpWlGo9Z8gUS92QXMIMxSZCxDdN4MflYWGio5HFvpS/msHVkK9H80nypSd
pLS3FP0arr/3tETS8TIhs4aISwUUfHm0W7WrmLaQz8TyfuktVtPrKIMmWgXiJmCo
HQkuFe4rjx0y7r8CGQocwo79+m+35aLip44jWB4yLuUgp0wVhT5nxfG/iNX2lUiP
Bw/yCpzeJoLBWvFDlunBNu2s0Y3ddFdnlna/k7CQM1Js6+OGQBMh1zTtJlPkkHj3
mbaTR6i5yro01FowChTryrRTVfMe
-----END CERTIFICATE-----";

fn pem_for_region(region: &str) -> &'static str {
    // Per the ec2-ami-tools docs, a non-default certificate is required only
    // for the us-gov-west-1 and cn-north-1 regions.
    match region {
        "us-gov-west-1" => CERT_EC2_GOV,
        "cn-north-1" => CERT_EC2_CN_NORTH_1,
        _ => CERT_EC2,
    }
}

/// The X.509 certificate EC2 uses to decrypt manifests in `region`.
pub fn certificate_for_region(region: &str) -> Result<Certificate> {
    Certificate::from_pem(pem_for_region(region)).map_err(|e| BundleError::Region {
        region: region.to_string(),
        reason: format!("malformed certificate: {e}"),
    })
}

/// The RSA public key EC2 uses to decrypt manifests in `region`.
pub fn public_key_for_region(region: &str) -> Result<RsaPublicKey> {
    let cert = certificate_for_region(region)?;
    let spki = &cert.tbs_certificate.subject_public_key_info;

    let der = spki.subject_public_key.as_bytes().ok_or_else(|| BundleError::Region {
        region: region.to_string(),
        reason: "public key is not an octet-aligned bit string".to_string(),
    })?;
    RsaPublicKey::from_pkcs1_der(der).map_err(|e| BundleError::Region {
        region: region.to_string(),
        reason: format!("certificate does not carry an RSA key: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;

    // Produced by `openssl x509`ing the official PEMs.
    const MODULUS_EC2: &str = "bcbff5f9cd9bfc08055f366bc13346ebfd151c7f5c14f310b9776a2d15042c40a077aa25a88f7a0778e5ac90e9533c5559f0dfbf84468c8f2394920dbe83a5c46a0090b45084073515a0c8e240804f8968f9096905b656afdb3b77dcb67412b4cd0f8c658fb15016a6dacad1d4f71b907053b6a75d9b7484e206ce4ac288bd6d";
    const MODULUS_EC2_GOV: &str = "db212a78700d4676ffa549c154ec5cc508d4219de6ba52a522d40871aea8823e04352f9e9fec3f1775bbaf88d50adb69a0403a6ebe7af33becceef3495d8dfe256d3454eb3d3603c45c19a7e945784753fb0e58cabab586991a7c163d72554e2c4a066aaafef84b2843d19e0049ccd570e89364809eb90a09c26799f05db4a0b";
    const MODULUS_EC2_CN_NORTH_1: &str = "eb4d5513d6a752790ce707a04c7114a8d913edfc1a28aa1333ea15ea7d21e43e0b17fa98ec8b92ed89713f7d3c3f4d3213a227e191c7bdcd44fd7d5eb37eadee88dd971f0f8348f314b8abdbb0564a5f9d7591892e5d2ef051732543e6a9e890656de62a8b0ea80a23fc2e61b2f5e74a62c6c5deb5f5e1b3dbe29e977f0b3e1c3303c3d978d86297f78ae77a28fe1edd66f454b47dbecdb617c6ae50dadb1137511fe1068d78a1d276ea68f1e14d52799281e118cf5442ff64039fa30aeee5e28ce7ede06ea210ee1cf8f791c0bc815bc60c95ad92264d67e33e20992276d6e099d01bf40368ffddff899a0368e102c8025fd40560534fe7920056302d50e5af";

    #[test]
    fn region_selects_the_expected_modulus() {
        let cases = [
            ("us-east-1", MODULUS_EC2),
            ("us-west-2", MODULUS_EC2),
            ("us-future-region-47", MODULUS_EC2),
            ("atlantis-4", MODULUS_EC2),
            ("us-gov-west-1", MODULUS_EC2_GOV),
            ("cn-north-1", MODULUS_EC2_CN_NORTH_1),
        ];
        for (region, expected) in cases {
            let key = public_key_for_region(region).unwrap();
            assert_eq!(key.n().to_str_radix(16), expected, "region {region}");
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let a = public_key_for_region("eu-west-1").unwrap();
        let b = public_key_for_region("eu-west-1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn gov_and_default_keys_differ() {
        let default = public_key_for_region("us-east-1").unwrap();
        let gov = public_key_for_region("us-gov-west-1").unwrap();
        assert_ne!(default.n(), gov.n());
    }
}
