// Organizations, groups, RBAC/PDP, and two-factor endpoints OpenAPI documentation

use serde_json::json;

pub fn authorize_endpoint() -> serde_json::Value {
    json!({
        "post": {
            "tags": ["Authorization"],
            "summary": "Evaluate an authorization decision",
            "description": "Checks whether the caller may perform `action` on `resource` within `org_id`. Always writes an audit row, whether the decision is granted or denied.",
            "operationId": "authorize",
            "security": [{ "bearerAuth": [] }],
            "requestBody": {
                "required": true,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/AuthorizeRequest" }
                    }
                }
            },
            "responses": {
                "200": {
                    "description": "Authorization decision",
                    "content": {
                        "application/json": {
                            "schema": { "$ref": "#/components/schemas/AuthorizeResponse" }
                        }
                    }
                },
                "401": { "description": "Unauthorized - Invalid or missing token" },
                "429": { "description": "Too Many Requests" }
            }
        }
    })
}

pub fn list_permissions_endpoint() -> serde_json::Value {
    json!({
        "get": {
            "tags": ["Authorization"],
            "summary": "List the system-wide permission catalog",
            "operationId": "listPermissions",
            "security": [{ "bearerAuth": [] }],
            "responses": {
                "200": {
                    "description": "Permission catalog",
                    "content": {
                        "application/json": {
                            "schema": {
                                "type": "array",
                                "items": { "$ref": "#/components/schemas/PermissionResponse" }
                            }
                        }
                    }
                }
            }
        }
    })
}

pub fn create_organization_endpoint() -> serde_json::Value {
    json!({
        "post": {
            "tags": ["Organizations"],
            "summary": "Create an organization",
            "description": "Creates a new organization and adds the caller as its Owner.",
            "operationId": "createOrganization",
            "security": [{ "bearerAuth": [] }],
            "requestBody": {
                "required": true,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/CreateOrganizationRequest" }
                    }
                }
            },
            "responses": {
                "201": {
                    "description": "Organization created",
                    "content": {
                        "application/json": {
                            "schema": { "$ref": "#/components/schemas/OrganizationResponse" }
                        }
                    }
                },
                "409": { "description": "Conflict - slug already taken" }
            }
        }
    })
}

pub fn organization_members_endpoint() -> serde_json::Value {
    json!({
        "get": {
            "tags": ["Organizations"],
            "summary": "List organization members",
            "operationId": "listMembers",
            "security": [{ "bearerAuth": [] }],
            "responses": {
                "200": {
                    "description": "Member list",
                    "content": {
                        "application/json": {
                            "schema": {
                                "type": "array",
                                "items": { "$ref": "#/components/schemas/MemberResponse" }
                            }
                        }
                    }
                },
                "403": { "description": "Not a member of this organization" }
            }
        },
        "post": {
            "tags": ["Organizations"],
            "summary": "Add a member to an organization",
            "description": "Requires at least the Admin role.",
            "operationId": "addMember",
            "security": [{ "bearerAuth": [] }],
            "requestBody": {
                "required": true,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/AddMemberRequest" }
                    }
                }
            },
            "responses": {
                "201": { "description": "Member added" },
                "403": { "description": "Caller lacks the Admin role" }
            }
        }
    })
}

pub fn two_factor_enroll_endpoint() -> serde_json::Value {
    json!({
        "post": {
            "tags": ["Two-Factor"],
            "summary": "Begin TOTP enrollment",
            "description": "Stores a sealed TOTP secret and returns the otpauth URI plus one-time-displayed backup codes. Two-factor authentication is not active until confirmed.",
            "operationId": "twoFactorEnroll",
            "security": [{ "bearerAuth": [] }],
            "responses": {
                "200": {
                    "description": "Enrollment material",
                    "content": {
                        "application/json": {
                            "schema": { "$ref": "#/components/schemas/TwoFactorEnrollResponse" }
                        }
                    }
                }
            }
        }
    })
}

pub fn two_factor_confirm_endpoint() -> serde_json::Value {
    json!({
        "post": {
            "tags": ["Two-Factor"],
            "summary": "Confirm TOTP enrollment",
            "description": "Verifies one TOTP code and flips two-factor authentication on.",
            "operationId": "twoFactorConfirm",
            "security": [{ "bearerAuth": [] }],
            "requestBody": {
                "required": true,
                "content": {
                    "application/json": {
                        "schema": {
                            "type": "object",
                            "required": ["code"],
                            "properties": { "code": { "type": "string" } }
                        }
                    }
                }
            },
            "responses": {
                "200": { "description": "Two-factor authentication enabled" },
                "400": { "description": "Invalid code" }
            }
        }
    })
}
