//! OpenAPI documentation
//!
//! Provides the OpenAPI 3.0 document and a Swagger UI page for the PhishSim API.

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::json;

/// Create OpenAPI routes
pub fn create_openapi_routes() -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
}

/// OpenAPI JSON specification endpoint
async fn openapi_json() -> impl IntoResponse {
    Json(get_openapi_spec())
}

/// Swagger UI HTML endpoint
async fn swagger_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

fn campaign_id_param() -> serde_json::Value {
    json!({"name": "id", "in": "path", "required": true, "schema": {"type": "string", "format": "uuid"}})
}

fn token_param() -> serde_json::Value {
    json!({"name": "token", "in": "path", "required": true, "schema": {"type": "string"}})
}

fn group_by_param() -> serde_json::Value {
    json!({
        "name": "group_by",
        "in": "query",
        "required": false,
        "schema": {"type": "string", "enum": ["department", "role", "location", "manager"], "default": "department"}
    })
}

fn json_body(schema: &str) -> serde_json::Value {
    json!({
        "application/json": {
            "schema": {"$ref": format!("#/components/schemas/{}", schema)}
        }
    })
}

/// Get the OpenAPI specification as JSON
fn get_openapi_spec() -> serde_json::Value {
    let secured = json!([{"api_key": []}, {"bearer": []}]);

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "PhishSim API",
            "description": "Phishing simulation campaigns for security-awareness training.\n\n## Authentication\n\nEndpoints under `/api` and `/metrics` require an operator API key.\n\n- **Header**: `X-API-Key: <your-api-key>`\n- **Bearer**: `Authorization: Bearer <your-api-key>`\n\nTracking endpoints (`/open`, `/t`, `/landing`, `/submit`) are public and keyed by the recipient token.",
            "version": env!("CARGO_PKG_VERSION"),
            "license": {
                "name": "Apache-2.0",
                "url": "https://www.apache.org/licenses/LICENSE-2.0"
            }
        },
        "tags": [
            {"name": "health", "description": "Health check endpoints"},
            {"name": "tracking", "description": "Public recipient tracking"},
            {"name": "campaigns", "description": "Campaign management and dispatch"},
            {"name": "stats", "description": "Campaign statistics"}
        ],
        "paths": {
            "/health": {
                "get": {
                    "tags": ["health"],
                    "summary": "Basic health check",
                    "operationId": "health",
                    "responses": {
                        "200": {"description": "Service is healthy", "content": json_body("HealthResponse")}
                    }
                }
            },
            "/health/live": {
                "get": {
                    "tags": ["health"],
                    "summary": "Liveness probe",
                    "operationId": "liveness",
                    "responses": {"200": {"description": "Service is alive"}}
                }
            },
            "/health/ready": {
                "get": {
                    "tags": ["health"],
                    "summary": "Readiness probe",
                    "operationId": "readiness",
                    "responses": {
                        "200": {"description": "Storage is reachable"},
                        "503": {"description": "Storage is not reachable"}
                    }
                }
            },
            "/health/detailed": {
                "get": {
                    "tags": ["health"],
                    "summary": "Detailed health check",
                    "operationId": "healthDetailed",
                    "responses": {"200": {"description": "Detailed health status"}}
                }
            },
            "/metrics": {
                "get": {
                    "tags": ["health"],
                    "summary": "Prometheus metrics",
                    "operationId": "metrics",
                    "security": secured,
                    "responses": {
                        "200": {"description": "Text exposition format"},
                        "401": {"description": "Missing or invalid API key"}
                    }
                }
            },
            "/open/{token}": {
                "get": {
                    "tags": ["tracking"],
                    "summary": "Open beacon",
                    "description": "Always returns the same 1x1 GIF, whether or not the token resolves.",
                    "operationId": "trackOpen",
                    "parameters": [token_param()],
                    "responses": {
                        "200": {"description": "Transparent GIF", "content": {"image/gif": {}}}
                    }
                }
            },
            "/t/{token}": {
                "get": {
                    "tags": ["tracking"],
                    "summary": "Tracked link",
                    "operationId": "trackClick",
                    "parameters": [token_param()],
                    "responses": {
                        "302": {"description": "Redirect to /landing/{token}"},
                        "404": {"description": "Invalid link"}
                    }
                }
            },
            "/landing/{token}": {
                "get": {
                    "tags": ["tracking"],
                    "summary": "Decoy credential page",
                    "operationId": "landingPage",
                    "parameters": [token_param()],
                    "responses": {
                        "200": {"description": "HTML page", "content": {"text/html": {}}},
                        "404": {"description": "Invalid link"}
                    }
                }
            },
            "/submit": {
                "post": {
                    "tags": ["tracking"],
                    "summary": "Decoy form submission",
                    "description": "Records the username and the password length only.",
                    "operationId": "trackSubmit",
                    "requestBody": {"required": true, "content": json_body("SubmitRequest")},
                    "responses": {
                        "200": {"description": "Educational disclosure", "content": json_body("SubmitResponse")},
                        "404": {"description": "Invalid token"}
                    }
                }
            },
            "/api/campaigns": {
                "get": {
                    "tags": ["campaigns"],
                    "summary": "List campaigns",
                    "operationId": "listCampaigns",
                    "security": secured,
                    "responses": {
                        "200": {
                            "description": "Campaigns, newest first",
                            "content": {
                                "application/json": {
                                    "schema": {"type": "array", "items": {"$ref": "#/components/schemas/Campaign"}}
                                }
                            }
                        }
                    }
                },
                "post": {
                    "tags": ["campaigns"],
                    "summary": "Create a campaign",
                    "operationId": "createCampaign",
                    "security": secured,
                    "requestBody": {"required": true, "content": json_body("CreateCampaignRequest")},
                    "responses": {
                        "201": {"description": "Campaign created", "content": json_body("Campaign")},
                        "400": {"description": "Validation error", "content": json_body("ErrorResponse")}
                    }
                }
            },
            "/api/campaigns/{id}": {
                "get": {
                    "tags": ["campaigns"],
                    "summary": "Campaign with per-target results",
                    "operationId": "getCampaign",
                    "security": secured,
                    "parameters": [campaign_id_param()],
                    "responses": {
                        "200": {"description": "Campaign details"},
                        "404": {"description": "Campaign not found"}
                    }
                }
            },
            "/api/campaigns/{id}/targets": {
                "post": {
                    "tags": ["campaigns"],
                    "summary": "Add recipients",
                    "description": "Rows without a valid email are reported and skipped.",
                    "operationId": "addTargets",
                    "security": secured,
                    "parameters": [campaign_id_param()],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": {"type": "array", "items": {"$ref": "#/components/schemas/NewTarget"}}
                            }
                        }
                    },
                    "responses": {
                        "200": {"description": "Import report"},
                        "404": {"description": "Campaign not found"}
                    }
                }
            },
            "/api/campaigns/{id}/send": {
                "post": {
                    "tags": ["campaigns"],
                    "summary": "Send to unsent targets",
                    "description": "Returns once the dispatch pass is queued.",
                    "operationId": "sendCampaign",
                    "security": secured,
                    "parameters": [campaign_id_param()],
                    "responses": {
                        "202": {"description": "Sending started"},
                        "200": {"description": "No unsent targets"},
                        "404": {"description": "Campaign not found"}
                    }
                }
            },
            "/api/campaigns/{id}/dispatch": {
                "get": {
                    "tags": ["campaigns"],
                    "summary": "Dispatch progress",
                    "operationId": "dispatchProgress",
                    "security": secured,
                    "parameters": [campaign_id_param()],
                    "responses": {
                        "200": {"description": "Worker state and counters"},
                        "404": {"description": "Campaign not found"}
                    }
                }
            },
            "/api/campaigns/{id}/export": {
                "get": {
                    "tags": ["campaigns"],
                    "summary": "Export results as CSV",
                    "operationId": "exportResults",
                    "security": secured,
                    "parameters": [campaign_id_param()],
                    "responses": {
                        "200": {"description": "CSV document", "content": {"text/csv": {}}},
                        "404": {"description": "Campaign not found"}
                    }
                }
            },
            "/api/campaigns/{id}/stats": {
                "get": {
                    "tags": ["stats"],
                    "summary": "Campaign statistics",
                    "operationId": "getCampaignStats",
                    "security": secured,
                    "parameters": [campaign_id_param(), group_by_param()],
                    "responses": {
                        "200": {"description": "Totals, rates and grouped breakdown"},
                        "400": {"description": "Unsupported group_by"},
                        "404": {"description": "Campaign not found"}
                    }
                }
            },
            "/api/stats": {
                "get": {
                    "tags": ["stats"],
                    "summary": "Statistics across every campaign",
                    "operationId": "getOverallStats",
                    "security": secured,
                    "parameters": [group_by_param()],
                    "responses": {
                        "200": {"description": "Overall, per-campaign and grouped statistics"},
                        "400": {"description": "Unsupported group_by"}
                    }
                }
            }
        },
        "components": {
            "securitySchemes": {
                "api_key": {
                    "type": "apiKey",
                    "in": "header",
                    "name": "X-API-Key"
                },
                "bearer": {
                    "type": "http",
                    "scheme": "bearer"
                }
            },
            "schemas": {
                "HealthResponse": {
                    "type": "object",
                    "properties": {
                        "status": {"type": "string", "example": "healthy"}
                    }
                },
                "ErrorResponse": {
                    "type": "object",
                    "properties": {
                        "error": {"type": "string", "example": "validation_error"},
                        "message": {"type": "string"}
                    }
                },
                "Campaign": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "format": "uuid"},
                        "name": {"type": "string"},
                        "email_subject": {"type": "string"},
                        "email_body": {"type": "string"},
                        "from_address": {"type": "string", "format": "email"},
                        "created_by": {"type": "string"},
                        "created_at": {"type": "string", "format": "date-time"}
                    }
                },
                "CreateCampaignRequest": {
                    "type": "object",
                    "required": ["name", "email_subject", "email_body", "from_address"],
                    "properties": {
                        "name": {"type": "string"},
                        "email_subject": {"type": "string", "example": "Action needed, {{Name}}"},
                        "email_body": {"type": "string", "example": "<a href=\"{{Link}}\">Review</a>"},
                        "from_address": {"type": "string", "format": "email"}
                    }
                },
                "NewTarget": {
                    "type": "object",
                    "required": ["email"],
                    "properties": {
                        "email": {"type": "string", "format": "email"},
                        "name": {"type": "string"},
                        "department": {"type": "string"},
                        "role": {"type": "string"},
                        "location": {"type": "string"},
                        "employee_id": {"type": "string"},
                        "manager": {"type": "string"}
                    }
                },
                "SubmitRequest": {
                    "type": "object",
                    "required": ["token"],
                    "properties": {
                        "token": {"type": "string"},
                        "username": {"type": "string"},
                        "password": {"type": "string"}
                    }
                },
                "SubmitResponse": {
                    "type": "object",
                    "properties": {
                        "success": {"type": "boolean"},
                        "message": {"type": "string"},
                        "details": {"type": "string"}
                    }
                }
            }
        }
    })
}

/// Swagger UI HTML template
const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>PhishSim API Documentation</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        body { margin: 0; padding: 0; }
        .swagger-ui .topbar { display: none; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: "/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIBundle.SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_every_route() {
        let spec = get_openapi_spec();
        let paths = spec["paths"].as_object().unwrap();
        for path in [
            "/open/{token}",
            "/t/{token}",
            "/landing/{token}",
            "/submit",
            "/api/campaigns/{id}/send",
            "/api/campaigns/{id}/export",
            "/api/stats",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }
        assert!(spec["paths"]["/open/{token}"]["get"]["security"].is_null());
        assert!(spec["paths"]["/metrics"]["get"]["security"].is_array());
    }
}
