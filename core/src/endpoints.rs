//! Static table of the appliance REST endpoints the connector calls.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::http::HttpMethod;

/// Prefix the appliance serves its open API under.
pub const OPENAPI_PREFIX: &str = "/openapi/v1";

/// Characters escaped when a scope name is substituted into a path.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'@')
    .add(b'%')
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'{')
    .add(b'}');

/// Logical operations exposed by the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListDimensions,
    ListMetrics,
    FlowSearch,
    ListScopes,
    ListSensors,
    ListAnnotations,
    UploadAnnotations,
    FlushAnnotations,
    ListUserRoles,
    ListUsers,
}

/// Method and path template for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub operation: Operation,
    pub method: HttpMethod,
    pub template: &'static str,
}

pub const ENDPOINTS: &[EndpointDescriptor] = &[
    EndpointDescriptor {
        operation: Operation::ListDimensions,
        method: HttpMethod::Get,
        template: "/openapi/v1/flowsearch/dimensions",
    },
    EndpointDescriptor {
        operation: Operation::ListMetrics,
        method: HttpMethod::Get,
        template: "/openapi/v1/flowsearch/metrics",
    },
    EndpointDescriptor {
        operation: Operation::FlowSearch,
        method: HttpMethod::Post,
        template: "/openapi/v1/flowsearch",
    },
    EndpointDescriptor {
        operation: Operation::ListScopes,
        method: HttpMethod::Get,
        template: "/openapi/v1/app_scopes",
    },
    EndpointDescriptor {
        operation: Operation::ListSensors,
        method: HttpMethod::Get,
        template: "/openapi/v1/sensors",
    },
    EndpointDescriptor {
        operation: Operation::ListAnnotations,
        method: HttpMethod::Get,
        template: "/openapi/v1/assets/cmdb/annotations/{scope_name}",
    },
    EndpointDescriptor {
        operation: Operation::UploadAnnotations,
        method: HttpMethod::Upload,
        template: "/openapi/v1/assets/cmdb/upload/{scope_name}",
    },
    EndpointDescriptor {
        operation: Operation::FlushAnnotations,
        method: HttpMethod::Post,
        template: "/openapi/v1/assets/cmdb/flush/{scope_name}",
    },
    EndpointDescriptor {
        operation: Operation::ListUserRoles,
        method: HttpMethod::Get,
        template: "/roles",
    },
    EndpointDescriptor {
        operation: Operation::ListUsers,
        method: HttpMethod::Get,
        template: "/users",
    },
];

impl Operation {
    pub fn descriptor(self) -> &'static EndpointDescriptor {
        ENDPOINTS
            .iter()
            .find(|d| d.operation == self)
            .unwrap_or(&ENDPOINTS[0])
    }

    pub fn method(self) -> HttpMethod {
        self.descriptor().method
    }

    /// Path for an operation without placeholders.
    pub fn path(self) -> String {
        self.descriptor().template.to_string()
    }

    /// Path with `{scope_name}` replaced by the percent-encoded scope.
    pub fn scoped_path(self, scope_name: &str) -> String {
        let encoded = utf8_percent_encode(scope_name, PATH_SEGMENT).to_string();
        self.descriptor().template.replace("{scope_name}", &encoded)
    }
}

/// Put `path` under the open API prefix unless it already is.
pub fn api_path(path: &str) -> String {
    if path.starts_with(OPENAPI_PREFIX) {
        path.to_string()
    } else {
        format!("{OPENAPI_PREFIX}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_has_one_descriptor() {
        for descriptor in ENDPOINTS {
            let matches = ENDPOINTS
                .iter()
                .filter(|d| d.operation == descriptor.operation)
                .count();
            assert_eq!(matches, 1, "{:?}", descriptor.operation);
            assert_eq!(descriptor.operation.descriptor(), descriptor);
        }
    }

    #[test]
    fn scoped_path_substitutes_scope() {
        assert_eq!(
            Operation::ListAnnotations.scoped_path("Default"),
            "/openapi/v1/assets/cmdb/annotations/Default"
        );
        assert_eq!(
            Operation::FlushAnnotations.scoped_path("Default:Finance"),
            "/openapi/v1/assets/cmdb/flush/Default:Finance"
        );
    }

    #[test]
    fn scoped_path_escapes_reserved_characters() {
        assert_eq!(
            Operation::UploadAnnotations.scoped_path("My Scope/A"),
            "/openapi/v1/assets/cmdb/upload/My%20Scope%2FA"
        );
    }

    #[test]
    fn methods_match_table() {
        assert_eq!(Operation::FlowSearch.method(), HttpMethod::Post);
        assert_eq!(Operation::UploadAnnotations.method(), HttpMethod::Upload);
        assert_eq!(Operation::ListUsers.method(), HttpMethod::Get);
    }

    #[test]
    fn api_path_prefixes_short_paths_once() {
        assert_eq!(api_path("/roles"), "/openapi/v1/roles");
        assert_eq!(api_path("/openapi/v1/sensors"), "/openapi/v1/sensors");
    }
}
