use crate::schema::response::MessageDataStream;

use enum_iterator::IntoEnumIterator;
use http::status::StatusCode;

use std::fmt;
use std::option::Option;
use std::string::String;


/// The protocol family that raised an exception. The family, not the code,
/// decides the wire format of the exception report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoEnumIterator)]
pub enum ServiceFamily {
    Common,
    Admin,
    Health,
    Tiles,
    Tms,
    Wms,
    Wmts,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionFormat {
    OgcXml,
    OwsXml,
    Json,
}

impl ServiceFamily {
    pub fn exception_format(&self) -> ExceptionFormat {
        match self {
            ServiceFamily::Wms => ExceptionFormat::OgcXml,
            ServiceFamily::Wmts | ServiceFamily::Tms => ExceptionFormat::OwsXml,
            ServiceFamily::Common
            | ServiceFamily::Admin
            | ServiceFamily::Health
            | ServiceFamily::Tiles => ExceptionFormat::Json,
        }
    }

    /// Which codes a family may legally carry.
    pub fn allows(&self, code: ExceptionCode) -> bool {
        use ExceptionCode::*;
        let ows = matches!(
            code,
            OwsMissingParameterValue
                | OwsInvalidParameterValue
                | OwsVersionNegotiationFailed
                | OwsOperationNotSupported
                | OwsNoApplicableCode
        );
        let generic = matches!(
            code,
            HttpNotFound | NotImplemented | ServiceUnavailable | InternalServerError
        );
        match self {
            ServiceFamily::Common | ServiceFamily::Health => ows || generic,
            ServiceFamily::Admin => {
                matches!(code, AdminConflict | AdminBadRequest | AdminNotFound) || ows || generic
            },
            ServiceFamily::Tiles | ServiceFamily::Tms => {
                ows || generic || matches!(code, RemoteSourceUnavailable)
            },
            ServiceFamily::Wms => {
                ows || generic
                    || matches!(
                        code,
                        WmsLayerNotDefined
                            | WmsStyleNotDefined
                            | WmsInvalidCrs
                            | WmsInvalidFormat
                            | WmsLayerNotQueryable
                            | RemoteSourceUnavailable
                    )
            },
            ServiceFamily::Wmts => {
                ows || generic
                    || matches!(
                        code,
                        WmsLayerNotDefined
                            | WmsStyleNotDefined
                            | WmsInvalidFormat
                            | WmsLayerNotQueryable
                            | WmtsInvalidTileMatrix
                            | WmtsTileOutOfRange
                            | RemoteSourceUnavailable
                    )
            },
        }
    }
}

/// The closed set of failure codes the dispatch engine can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoEnumIterator)]
pub enum ExceptionCode {
    OwsMissingParameterValue,
    OwsInvalidParameterValue,
    OwsVersionNegotiationFailed,
    OwsOperationNotSupported,
    OwsNoApplicableCode,
    WmsLayerNotDefined,
    WmsStyleNotDefined,
    WmsInvalidCrs,
    WmsInvalidFormat,
    WmsLayerNotQueryable,
    WmtsInvalidTileMatrix,
    WmtsTileOutOfRange,
    RemoteSourceUnavailable,
    HttpNotFound,
    AdminConflict,
    AdminBadRequest,
    AdminNotFound,
    NotImplemented,
    ServiceUnavailable,
    InternalServerError,
}

impl ExceptionCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            ExceptionCode::OwsMissingParameterValue => StatusCode::BAD_REQUEST,
            ExceptionCode::OwsInvalidParameterValue => StatusCode::BAD_REQUEST,
            ExceptionCode::OwsVersionNegotiationFailed => StatusCode::BAD_REQUEST,
            ExceptionCode::OwsOperationNotSupported => StatusCode::BAD_REQUEST,
            ExceptionCode::OwsNoApplicableCode => StatusCode::INTERNAL_SERVER_ERROR,
            ExceptionCode::WmsLayerNotDefined => StatusCode::BAD_REQUEST,
            ExceptionCode::WmsStyleNotDefined => StatusCode::BAD_REQUEST,
            ExceptionCode::WmsInvalidCrs => StatusCode::BAD_REQUEST,
            ExceptionCode::WmsInvalidFormat => StatusCode::BAD_REQUEST,
            ExceptionCode::WmsLayerNotQueryable => StatusCode::BAD_REQUEST,
            ExceptionCode::WmtsInvalidTileMatrix => StatusCode::BAD_REQUEST,
            ExceptionCode::WmtsTileOutOfRange => StatusCode::BAD_REQUEST,
            ExceptionCode::RemoteSourceUnavailable => StatusCode::BAD_GATEWAY,
            ExceptionCode::HttpNotFound => StatusCode::NOT_FOUND,
            ExceptionCode::AdminConflict => StatusCode::CONFLICT,
            ExceptionCode::AdminBadRequest => StatusCode::BAD_REQUEST,
            ExceptionCode::AdminNotFound => StatusCode::NOT_FOUND,
            ExceptionCode::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            ExceptionCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ExceptionCode::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The locator string written into exception reports, one per code.
    pub fn as_locator(&self) -> &'static str {
        match self {
            ExceptionCode::OwsMissingParameterValue => "MissingParameterValue",
            ExceptionCode::OwsInvalidParameterValue => "InvalidParameterValue",
            ExceptionCode::OwsVersionNegotiationFailed => "VersionNegotiationFailed",
            ExceptionCode::OwsOperationNotSupported => "OperationNotSupported",
            ExceptionCode::OwsNoApplicableCode => "NoApplicableCode",
            ExceptionCode::WmsLayerNotDefined => "LayerNotDefined",
            ExceptionCode::WmsStyleNotDefined => "StyleNotDefined",
            ExceptionCode::WmsInvalidCrs => "InvalidCRS",
            ExceptionCode::WmsInvalidFormat => "InvalidFormat",
            ExceptionCode::WmsLayerNotQueryable => "LayerNotQueryable",
            ExceptionCode::WmtsInvalidTileMatrix => "InvalidTileMatrix",
            ExceptionCode::WmtsTileOutOfRange => "TileOutOfRange",
            ExceptionCode::RemoteSourceUnavailable => "RemoteSourceUnavailable",
            ExceptionCode::HttpNotFound => "NotFound",
            ExceptionCode::AdminConflict => "Conflict",
            ExceptionCode::AdminBadRequest => "BadRequest",
            ExceptionCode::AdminNotFound => "ResourceNotFound",
            ExceptionCode::NotImplemented => "NotImplemented",
            ExceptionCode::ServiceUnavailable => "ServiceUnavailable",
            ExceptionCode::InternalServerError => "InternalServerError",
        }
    }

    pub fn from_locator(locator: &str) -> Option<ExceptionCode> {
        for code in ExceptionCode::into_enum_iter() {
            if code.as_locator() == locator {
                return Some(code);
            }
        }
        return None;
    }
}

/// A single admission failure, raised inside a service handler and consumed
/// once at the dispatch boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceException {
    pub family: ServiceFamily,
    pub code: ExceptionCode,
    pub message: String,
}

impl ServiceException {
    pub fn new(family: ServiceFamily, code: ExceptionCode, message: String) -> ServiceException {
        debug_assert!(
            family.allows(code),
            "code {:?} is not valid for family {:?}",
            code,
            family,
        );
        ServiceException {
            family,
            code,
            message,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Serialises the exception into the report format the owning protocol
    /// mandates and wraps it into a sendable stream.
    pub fn into_data_stream(self) -> MessageDataStream {
        let status = self.http_status();
        match self.family.exception_format() {
            ExceptionFormat::OgcXml => MessageDataStream::new(
                format!(
                    concat!(
                        "<ServiceExceptionReport xmlns=\"http://www.opengis.net/ogc\">\n",
                        "  <ServiceException code=\"{}\">{}</ServiceException>\n",
                        "</ServiceExceptionReport>",
                    ),
                    self.code.as_locator(),
                    self.message,
                ),
                mime::TEXT_XML,
                status,
            ),
            ExceptionFormat::OwsXml => MessageDataStream::new(
                format!(
                    concat!(
                        "<ExceptionReport xmlns=\"http://www.opengis.net/ows/1.1\">\n",
                        "  <Exception exceptionCode=\"{}\"><ExceptionText>{}</ExceptionText></Exception>\n",
                        "</ExceptionReport>",
                    ),
                    self.code.as_locator(),
                    self.message,
                ),
                mime::TEXT_XML,
                status,
            ),
            ExceptionFormat::Json => MessageDataStream::new(
                serde_json::json!({
                    "error": self.code.as_locator(),
                    "error_description": self.message,
                })
                .to_string(),
                mime::APPLICATION_JSON,
                status,
            ),
        }
    }
}

impl fmt::Display for ServiceException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} exception {}: {}",
            self.family,
            self.code.as_locator(),
            self.message,
        )
    }
}

impl std::error::Error for ServiceException {}
