// OpenAPI schema definitions

use serde_json::json;

/// Return all schema definitions
pub fn all_schemas() -> serde_json::Value {
    let schemas = json!({
        "RegisterRequest": register_request_schema(),
        "RegisterResponse": register_response_schema(),
        "LoginRequest": login_request_schema(),
        "LoginResponse": login_response_schema(),
        "LoginUserInfo": login_user_info_schema(),
        "RefreshTokenRequest": refresh_token_request_schema(),
        "RefreshTokenResponse": refresh_token_response_schema(),
        "AuthError": auth_error_schema(),
        "VerifyEmailRequest": verify_email_request_schema(),
        "VerifyEmailResponse": verify_email_response_schema(),
        "ResendVerificationRequest": resend_verification_request_schema(),
        "ResendVerificationResponse": resend_verification_response_schema(),
        "VerificationStatusResponse": verification_status_response_schema(),
        "ForgotPasswordRequest": forgot_password_request_schema(),
        "ForgotPasswordResponse": forgot_password_response_schema(),
        "ResetPasswordRequest": reset_password_request_schema(),
        "ResetPasswordResponse": reset_password_response_schema(),
        "AuthorizeRequest": authorize_request_schema(),
        "AuthorizeResponse": authorize_response_schema(),
        "PermissionResponse": permission_response_schema(),
        "CreateOrganizationRequest": create_organization_request_schema(),
        "OrganizationResponse": organization_response_schema(),
        "AddMemberRequest": add_member_request_schema(),
        "MemberResponse": member_response_schema(),
        "TwoFactorEnrollResponse": two_factor_enroll_response_schema(),
    });

    schemas
}

fn register_request_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["email", "username", "password", "password_confirmation"],
        "properties": {
            "email": {
                "type": "string",
                "format": "email",
                "maxLength": 320,
                "description": "User's email address (stored in lowercase)"
            },
            "username": {
                "type": "string",
                "minLength": 3,
                "maxLength": 64,
                "description": "Unique username"
            },
            "password": {
                "type": "string",
                "format": "password",
                "minLength": 8,
                "description": "Password with uppercase, lowercase, number, and special character"
            },
            "password_confirmation": {
                "type": "string",
                "format": "password",
                "description": "Must match the password field"
            }
        }
    })
}

fn register_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "user_id": {
                "type": "string",
                "format": "uuid"
            },
            "email": {
                "type": "string",
                "format": "email"
            },
            "username": {
                "type": "string"
            },
            "email_verification_required": {
                "type": "boolean"
            },
            "verification_sent": {
                "type": "boolean",
                "description": "Whether a verification email was sent"
            },
            "message": {
                "type": "string"
            }
        }
    })
}

fn authorize_request_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["org_id", "resource", "action"],
        "properties": {
            "org_id": { "type": "string", "format": "uuid" },
            "resource": { "type": "string" },
            "action": { "type": "string" },
            "resource_id": { "type": "string", "nullable": true },
            "correlation_id": { "type": "string", "nullable": true }
        }
    })
}

fn authorize_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "granted": { "type": "boolean" },
            "reason": { "type": "string" },
            "matched_group_ids": {
                "type": "array",
                "items": { "type": "string", "format": "uuid" }
            },
            "cache_source": {
                "type": "string",
                "enum": ["l1", "l2", "db"]
            }
        }
    })
}

fn permission_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "format": "uuid" },
            "name": { "type": "string", "description": "resource:action" },
            "description": { "type": "string", "nullable": true }
        }
    })
}

fn create_organization_request_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["name", "slug"],
        "properties": {
            "name": { "type": "string" },
            "slug": { "type": "string" }
        }
    })
}

fn organization_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "format": "uuid" },
            "name": { "type": "string" },
            "slug": { "type": "string" },
            "status": { "type": "string" }
        }
    })
}

fn add_member_request_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["user_id", "role"],
        "properties": {
            "user_id": { "type": "string", "format": "uuid" },
            "role": { "type": "string", "enum": ["member", "admin", "owner"] }
        }
    })
}

fn member_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "user_id": { "type": "string", "format": "uuid" },
            "org_id": { "type": "string", "format": "uuid" },
            "role": { "type": "string" }
        }
    })
}

fn two_factor_enroll_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "otpauth_uri": { "type": "string" },
            "backup_codes": {
                "type": "array",
                "items": { "type": "string" }
            }
        }
    })
}

fn login_request_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["email", "password"],
        "properties": {
            "email": {
                "type": "string",
                "format": "email",
                "description": "User's email address"
            },
            "password": {
                "type": "string",
                "format": "password",
                "description": "User's password"
            },
            "remember_me": {
                "type": "boolean",
                "default": false,
                "description": "Extend refresh token expiry to 30 days"
            }
        }
    })
}

fn login_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "access_token": {
                "type": "string",
                "description": "JWT access token for API requests"
            },
            "refresh_token": {
                "type": "string",
                "description": "JWT refresh token for obtaining new access tokens"
            },
            "expires_in": {
                "type": "integer",
                "description": "Access token expiry time in seconds"
            },
            "token_type": {
                "type": "string",
                "description": "Token type (always 'Bearer')",
                "default": "Bearer"
            },
            "user": {
                "$ref": "#/components/schemas/LoginUserInfo"
            }
        }
    })
}

fn login_user_info_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "format": "uuid",
                "description": "User's unique identifier"
            },
            "email": {
                "type": "string",
                "format": "email",
                "description": "User's email address"
            },
            "full_name": {
                "type": "string",
                "description": "User's full name"
            },
            "subscription_tier": {
                "type": "string",
                "description": "User's subscription tier",
                "enum": ["free", "basic", "pro", "enterprise"]
            },
            "onboarding_status": {
                "type": "string",
                "description": "User's onboarding status",
                "enum": ["registered", "verified", "plan_selected", "payment_pending", "completed"]
            }
        }
    })
}

fn refresh_token_request_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["refresh_token"],
        "properties": {
            "refresh_token": {
                "type": "string",
                "description": "JWT refresh token obtained from login or previous refresh"
            }
        }
    })
}

fn refresh_token_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "access_token": {
                "type": "string",
                "description": "New JWT access token for API requests"
            },
            "refresh_token": {
                "type": "string",
                "description": "New JWT refresh token (rotated for security)"
            },
            "expires_in": {
                "type": "integer",
                "description": "Access token expiry time in seconds"
            },
            "token_type": {
                "type": "string",
                "description": "Token type (always 'Bearer')",
                "default": "Bearer"
            }
        }
    })
}

fn auth_error_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "success": {
                "type": "boolean",
                "description": "Always false for errors"
            },
            "error": {
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Error code",
                        "enum": ["INVALID_CREDENTIALS", "ACCOUNT_LOCKED", "EMAIL_NOT_VERIFIED", "ACCOUNT_INACTIVE", "RATE_LIMITED", "DATABASE_ERROR", "TOKEN_ERROR", "INVALID_TOKEN", "USER_NOT_FOUND", "VALIDATION_ERROR", "INTERNAL_ERROR"]
                    },
                    "description": {
                        "type": "string",
                        "description": "Human-readable error description"
                    },
                    "retry_after": {
                        "type": "integer",
                        "nullable": true,
                        "description": "Seconds until retry is allowed (for rate limiting and lockout)"
                    }
                }
            },
            "message": {
                "type": "string",
                "description": "Error message"
            }
        }
    })
}

fn verify_email_request_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["email", "code"],
        "properties": {
            "email": {
                "type": "string",
                "format": "email",
                "description": "Email address to verify"
            },
            "code": {
                "type": "string",
                "pattern": "^[0-9]{6}$",
                "description": "6-digit verification code"
            }
        }
    })
}

fn verify_email_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "success": {
                "type": "boolean",
                "description": "Whether verification was successful"
            },
            "message": {
                "type": "string",
                "description": "Success message"
            },
            "email": {
                "type": "string",
                "format": "email",
                "description": "Verified email address"
            },
            "user_id": {
                "type": "string",
                "format": "uuid",
                "description": "User ID of verified account"
            }
        }
    })
}

fn resend_verification_request_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["email"],
        "properties": {
            "email": {
                "type": "string",
                "format": "email",
                "description": "Email address to resend verification code to"
            }
        }
    })
}

fn resend_verification_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "success": {
                "type": "boolean",
                "description": "Whether resend was successful"
            },
            "message": {
                "type": "string",
                "description": "Success message"
            },
            "cooldown_seconds": {
                "type": "integer",
                "nullable": true,
                "description": "Seconds until next resend is allowed"
            },
            "remaining_resends": {
                "type": "integer",
                "description": "Number of resends remaining today"
            }
        }
    })
}

fn verification_status_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "email": {
                "type": "string",
                "format": "email",
                "description": "Email address checked"
            },
            "is_verified": {
                "type": "boolean",
                "description": "Whether email is verified"
            },
            "verified_at": {
                "type": "string",
                "format": "date-time",
                "nullable": true,
                "description": "Timestamp when email was verified"
            }
        }
    })
}

fn forgot_password_request_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["email"],
        "properties": {
            "email": {
                "type": "string",
                "format": "email",
                "maxLength": 320,
                "description": "Email address to send password reset link to"
            }
        }
    })
}

fn forgot_password_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "success": {
                "type": "boolean",
                "description": "Always true for security (even if email doesn't exist)"
            },
            "message": {
                "type": "string",
                "description": "Success message"
            },
            "data": {
                "type": "object",
                "nullable": true,
                "description": "Additional data (currently null)"
            }
        }
    })
}

fn reset_password_request_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["token", "new_password", "confirm_password"],
        "properties": {
            "token": {
                "type": "string",
                "minLength": 32,
                "maxLength": 64,
                "description": "Password reset token from email"
            },
            "new_password": {
                "type": "string",
                "format": "password",
                "minLength": 8,
                "maxLength": 128,
                "description": "New password (8-128 characters)"
            },
            "confirm_password": {
                "type": "string",
                "format": "password",
                "description": "Must match new_password exactly"
            }
        }
    })
}

fn reset_password_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "success": {
                "type": "boolean",
                "description": "Whether password reset was successful"
            },
            "message": {
                "type": "string",
                "description": "Success message"
            },
            "data": {
                "type": "object",
                "nullable": true,
                "description": "Additional data (currently null)"
            }
        }
    })
}
